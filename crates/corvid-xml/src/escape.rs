//! Entity escaping for text content and attribute values.

use crate::error::XmlError;
use std::borrow::Cow;

/// Escape character data for use between tags.
#[must_use]
pub fn escape_text(input: &str) -> Cow<'_, str> {
    escape_with(input, |c| match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    })
}

/// Escape an attribute value for use inside `"`-delimited quotes.
#[must_use]
pub fn escape_attribute(input: &str) -> Cow<'_, str> {
    escape_with(input, |c| match c {
        '&' => Some("&amp;"),
        '"' => Some("&quot;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    })
}

fn escape_with(input: &str, map: impl Fn(char) -> Option<&'static str>) -> Cow<'_, str> {
    if !input.chars().any(|c| map(c).is_some()) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match map(c) {
            Some(replacement) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Resolve the predefined entities and numeric character references.
///
/// # Errors
///
/// Returns [`XmlError::InvalidEntity`] for an unterminated reference, an
/// unknown entity name, or a code point that is not a valid `char`.
pub fn unescape(input: &str) -> Result<Cow<'_, str>, XmlError> {
    if !input.contains('&') {
        return Ok(Cow::Borrowed(input));
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| XmlError::InvalidEntity(after.chars().take(8).collect()))?;
        let entity = &after[..semi];
        out.push(resolve_entity(entity)?);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

fn resolve_entity(entity: &str) -> Result<char, XmlError> {
    let invalid = || XmlError::InvalidEntity(entity.to_string());
    match entity {
        "amp" => Ok('&'),
        "lt" => Ok('<'),
        "gt" => Ok('>'),
        "quot" => Ok('"'),
        "apos" => Ok('\''),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).map_err(|_| invalid())?
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().map_err(|_| invalid())?
            } else {
                return Err(invalid());
            };
            char::from_u32(code).ok_or_else(invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert!(matches!(escape_text("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_attribute_quotes() {
        assert_eq!(escape_attribute("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(escape_attribute("it's"), "it's");
    }

    #[test]
    fn test_unescape_predefined() {
        assert_eq!(
            unescape("&lt;body&gt; &amp; &quot;x&quot; &apos;y&apos;").unwrap(),
            "<body> & \"x\" 'y'"
        );
    }

    #[test]
    fn test_unescape_numeric() {
        assert_eq!(unescape("&#65;&#x42;&#X43;").unwrap(), "ABC");
        assert_eq!(unescape("&#x1F600;").unwrap(), "\u{1F600}");
    }

    #[test]
    fn test_unescape_rejects_unknown() {
        assert!(matches!(unescape("&nbsp;"), Err(XmlError::InvalidEntity(_))));
        assert!(matches!(unescape("a & b"), Err(XmlError::InvalidEntity(_))));
        assert!(unescape("&#xD800;").is_err());
    }
}
