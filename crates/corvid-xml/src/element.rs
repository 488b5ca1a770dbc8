//! Element tree produced by the assembler and built by protocol handlers.

use std::fmt;

/// Attribute on an element.
///
/// Namespace declarations (`xmlns`, `xmlns:p`) are kept as attributes so
/// that rendering an element re-emits exactly the declarations it arrived
/// with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    prefix: Option<String>,
    name: String,
    value: String,
}

impl Attribute {
    /// Create an attribute from a possibly prefixed name
    pub fn new(qualified_name: impl AsRef<str>, value: impl Into<String>) -> Self {
        let (prefix, name) = split_qualified(qualified_name.as_ref());
        Self {
            prefix: prefix.map(str::to_string),
            name: name.to_string(),
            value: value.into(),
        }
    }

    /// Namespace prefix, if any
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Local name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as written, `prefix:name` or `name`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }

    /// Attribute value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// If this attribute declares a namespace, the declared prefix
    /// (`Some(None)` for the default namespace).
    #[must_use]
    pub fn declared_prefix(&self) -> Option<Option<&str>> {
        match (self.prefix.as_deref(), self.name.as_str()) {
            (None, "xmlns") => Some(None),
            (Some("xmlns"), name) => Some(Some(name)),
            _ => None,
        }
    }
}

/// Child node of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element
    Element(Element),
    /// Character data
    Text(String),
}

/// XML element with resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    prefix: Option<String>,
    name: String,
    namespace_uri: Option<String>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    /// Create an element with no namespace, attributes, or children
    pub fn new(qualified_name: impl AsRef<str>) -> Self {
        let (prefix, name) = split_qualified(qualified_name.as_ref());
        Self {
            prefix: prefix.map(str::to_string),
            name: name.to_string(),
            namespace_uri: None,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Start building an element
    pub fn builder(qualified_name: impl AsRef<str>) -> ElementBuilder {
        ElementBuilder::new(qualified_name)
    }

    /// Local name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace prefix
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Name as written, `prefix:name` or `name`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }

    /// Resolved namespace URI
    #[must_use]
    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace_uri.as_deref()
    }

    /// Set the resolved namespace URI
    pub fn set_namespace_uri(&mut self, uri: Option<String>) {
        self.namespace_uri = uri;
    }

    /// Whether the element has the given local name and namespace
    #[must_use]
    pub fn is(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace_uri.as_deref() == Some(namespace)
    }

    /// All attributes in document order
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Value of an unprefixed attribute
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.prefix.is_none() && a.name == name)
            .map(Attribute::value)
    }

    /// Value of an attribute by qualified name (`xml:lang`)
    #[must_use]
    pub fn qualified_attribute(&self, qualified_name: &str) -> Option<&str> {
        let (prefix, name) = split_qualified(qualified_name);
        self.attributes
            .iter()
            .find(|a| a.prefix.as_deref() == prefix && a.name == name)
            .map(Attribute::value)
    }

    /// Set or replace an attribute
    pub fn set_attribute(&mut self, qualified_name: &str, value: impl Into<String>) {
        let attribute = Attribute::new(qualified_name, value);
        match self
            .attributes
            .iter_mut()
            .find(|a| a.prefix == attribute.prefix && a.name == attribute.name)
        {
            Some(existing) => existing.value = attribute.value,
            None => self.attributes.push(attribute),
        }
    }

    /// Remove an unprefixed attribute, returning its value
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self
            .attributes
            .iter()
            .position(|a| a.prefix.is_none() && a.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    /// The namespace this element declares as default (its own `xmlns`)
    #[must_use]
    pub fn declared_namespace(&self) -> Option<&str> {
        self.attribute("xmlns")
    }

    /// Namespace declarations carried by this element as `(prefix, uri)`
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (Option<&str>, &str)> {
        self.attributes
            .iter()
            .filter_map(|a| a.declared_prefix().map(|p| (p, a.value())))
    }

    /// Child nodes
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements, skipping text
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// First child element with the given local name and namespace
    #[must_use]
    pub fn child_ns(&self, name: &str, namespace: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(name, namespace))
    }

    /// Concatenated direct text children
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Append a child element
    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append text, merging with a preceding text node
    pub fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    /// Move this element and every descendant in namespace `from` to `to`
    pub fn rename_namespace(&mut self, from: &str, to: &str) {
        if self.namespace_uri.as_deref() == Some(from) {
            self.namespace_uri = Some(to.to_string());
        }
        for child in &mut self.children {
            if let Node::Element(e) = child {
                e.rename_namespace(from, to);
            }
        }
    }

    /// Consume the element, returning its children
    #[must_use]
    pub fn into_children(self) -> Vec<Node> {
        self.children
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::render::render(self))
    }
}

/// Builder for outbound elements
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    element: Element,
}

impl ElementBuilder {
    /// Create a builder for an element named `qualified_name`
    pub fn new(qualified_name: impl AsRef<str>) -> Self {
        Self {
            element: Element::new(qualified_name),
        }
    }

    /// Set the namespace; unprefixed elements render an `xmlns` when it
    /// differs from the inherited default
    #[must_use]
    pub fn namespace(mut self, uri: impl Into<String>) -> Self {
        self.element.namespace_uri = Some(uri.into());
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn attribute(mut self, qualified_name: &str, value: impl Into<String>) -> Self {
        self.element.set_attribute(qualified_name, value);
        self
    }

    /// Add an attribute if `value` is present
    #[must_use]
    pub fn attribute_opt(self, qualified_name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.attribute(qualified_name, v),
            None => self,
        }
    }

    /// Declare a prefixed namespace on this element
    #[must_use]
    pub fn declare(mut self, prefix: &str, uri: impl Into<String>) -> Self {
        self.element.set_attribute(&format!("xmlns:{prefix}"), uri);
        self
    }

    /// Add a child element
    #[must_use]
    pub fn child(mut self, child: Element) -> Self {
        self.element.push_child(child);
        self
    }

    /// Add several child nodes
    #[must_use]
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.element.children.extend(nodes);
        self
    }

    /// Add a text child
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.element.push_text(text);
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> Element {
        self.element
    }
}

pub(crate) fn split_qualified(qualified: &str) -> (Option<&str>, &str) {
    match qualified.split_once(':') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, qualified),
    }
}

fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let iq = Element::builder("iq")
            .attribute("type", "result")
            .attribute("id", "b1")
            .child(
                Element::builder("bind")
                    .namespace("urn:ietf:params:xml:ns:xmpp-bind")
                    .child(Element::builder("jid").text("a@b/c").build())
                    .build(),
            )
            .build();

        assert_eq!(iq.attribute("type"), Some("result"));
        let bind = iq.child_ns("bind", "urn:ietf:params:xml:ns:xmpp-bind").unwrap();
        assert_eq!(bind.child("jid").unwrap().text(), "a@b/c");
    }

    #[test]
    fn test_qualified_names() {
        let e = Element::new("stream:features");
        assert_eq!(e.prefix(), Some("stream"));
        assert_eq!(e.name(), "features");
        assert_eq!(e.qualified_name(), "stream:features");
    }

    #[test]
    fn test_namespace_declarations() {
        let e = Element::builder("stream:stream")
            .attribute("xmlns", "jabber:client")
            .declare("stream", "http://etherx.jabber.org/streams")
            .attribute("xml:lang", "en")
            .build();
        let decls: Vec<_> = e.namespace_declarations().collect();
        assert_eq!(
            decls,
            vec![
                (None, "jabber:client"),
                (Some("stream"), "http://etherx.jabber.org/streams")
            ]
        );
        assert_eq!(e.declared_namespace(), Some("jabber:client"));
        assert_eq!(e.qualified_attribute("xml:lang"), Some("en"));
        assert_eq!(e.attribute("lang"), None);
    }

    #[test]
    fn test_set_and_remove_attribute() {
        let mut e = Element::builder("message").attribute("to", "a@b").build();
        e.set_attribute("to", "c@d");
        assert_eq!(e.attributes().len(), 1);
        assert_eq!(e.remove_attribute("to").as_deref(), Some("c@d"));
        assert_eq!(e.attribute("to"), None);
    }

    #[test]
    fn test_push_text_merges() {
        let mut e = Element::new("body");
        e.push_text("a");
        e.push_text("b");
        assert_eq!(e.children().len(), 1);
        assert_eq!(e.text(), "ab");
    }

    #[test]
    fn test_rename_namespace() {
        let mut msg = Element::builder("message")
            .namespace("jabber:server")
            .child(Element::builder("body").namespace("jabber:server").text("hi").build())
            .child(Element::builder("x").namespace("urn:other").build())
            .build();
        msg.rename_namespace("jabber:server", "jabber:client");
        assert_eq!(msg.namespace_uri(), Some("jabber:client"));
        assert!(msg.child_ns("body", "jabber:client").is_some());
        assert!(msg.child_ns("x", "urn:other").is_some());
    }
}
