//! Namespace scoping for the assembler.

use crate::element::{Element, split_qualified};
use crate::error::XmlError;

/// Namespace bound to the reserved `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Stack of in-scope namespace declarations, one frame per open element.
#[derive(Debug, Default, Clone)]
pub struct NamespaceScope {
    frames: Vec<Vec<(Option<String>, String)>>,
}

impl NamespaceScope {
    /// Create an empty scope
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a frame holding the declarations carried by `element`
    pub fn push(&mut self, element: &Element) {
        let frame = element
            .namespace_declarations()
            .map(|(p, uri)| (p.map(str::to_string), uri.to_string()))
            .collect();
        self.frames.push(frame);
    }

    /// Close the innermost frame
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Number of open frames
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop all frames
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Resolve a prefix (or the default namespace for `None`) to its URI
    #[must_use]
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Resolve and record the namespace of `element` against this scope.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::UnboundPrefix`] if the element or one of its
    /// attributes uses a prefix with no declaration in scope.
    pub fn bind(&self, element: &mut Element) -> Result<(), XmlError> {
        let uri = match element.prefix() {
            Some(prefix) => Some(
                self.resolve(Some(prefix))
                    .ok_or_else(|| XmlError::UnboundPrefix(prefix.to_string()))?
                    .to_string(),
            ),
            None => self.resolve(None).map(str::to_string),
        };
        element.set_namespace_uri(uri);

        for attribute in element.attributes() {
            if let Some(prefix) = attribute.prefix() {
                if prefix != "xmlns" && self.resolve(Some(prefix)).is_none() {
                    return Err(XmlError::UnboundPrefix(prefix.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Split a qualified name, rejecting an empty prefix or local part.
pub(crate) fn checked_split(qualified: &str) -> Result<(Option<&str>, &str), XmlError> {
    let (prefix, local) = split_qualified(qualified);
    if local.is_empty() || prefix.is_some_and(str::is_empty) || local.contains(':') {
        return Err(XmlError::MalformedTag(qualified.to_string()));
    }
    Ok((prefix, local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_nested() {
        let mut scope = NamespaceScope::new();
        scope.push(
            &Element::builder("stream:stream")
                .attribute("xmlns", "jabber:client")
                .declare("stream", "http://etherx.jabber.org/streams")
                .build(),
        );
        assert_eq!(scope.resolve(None), Some("jabber:client"));

        scope.push(&Element::builder("ping").attribute("xmlns", "urn:xmpp:ping").build());
        assert_eq!(scope.resolve(None), Some("urn:xmpp:ping"));
        assert_eq!(scope.resolve(Some("stream")), Some("http://etherx.jabber.org/streams"));

        scope.pop();
        assert_eq!(scope.resolve(None), Some("jabber:client"));
    }

    #[test]
    fn test_bind_unbound_prefix() {
        let scope = NamespaceScope::new();
        let mut e = Element::new("db:result");
        assert_eq!(
            scope.bind(&mut e),
            Err(XmlError::UnboundPrefix("db".to_string()))
        );
    }

    #[test]
    fn test_xml_prefix_is_implicit() {
        let scope = NamespaceScope::new();
        let mut e = Element::builder("body").attribute("xml:lang", "en").build();
        assert!(scope.bind(&mut e).is_ok());
        assert_eq!(e.namespace_uri(), None);
    }

    #[test]
    fn test_undeclare_default() {
        let mut scope = NamespaceScope::new();
        scope.push(&Element::builder("a").attribute("xmlns", "urn:a").build());
        scope.push(&Element::builder("b").attribute("xmlns", "").build());
        assert_eq!(scope.resolve(None), None);
    }

    #[test]
    fn test_checked_split() {
        assert_eq!(checked_split("a:b").unwrap(), (Some("a"), "b"));
        assert!(checked_split(":b").is_err());
        assert!(checked_split("a:").is_err());
        assert!(checked_split("a:b:c").is_err());
    }
}
