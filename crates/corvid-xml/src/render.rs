//! Serialization of elements back to wire text.

use crate::element::{Element, Node};
use crate::escape::{escape_attribute, escape_text};
use std::fmt::Write;

/// Render a complete element with no inherited default namespace.
#[must_use]
pub fn render(element: &Element) -> String {
    render_in(element, None)
}

/// Render a complete element as a child of a context whose default namespace
/// is `inherited`.
///
/// An unprefixed element whose namespace differs from the inherited default
/// and that carries no `xmlns` attribute of its own gets one emitted.
#[must_use]
pub fn render_in(element: &Element, inherited: Option<&str>) -> String {
    let mut out = String::with_capacity(128);
    write_element(&mut out, element, inherited);
    out
}

/// Render only the start tag of `element`, leaving it open.
///
/// Used for the stream opener, whose close tag is written at session end.
#[must_use]
pub fn render_open(element: &Element) -> String {
    let mut out = String::with_capacity(256);
    write_start(&mut out, element, None);
    out.push('>');
    out
}

/// Render the close tag for an element name
#[must_use]
pub fn render_close(qualified_name: &str) -> String {
    format!("</{qualified_name}>")
}

fn write_start<'a>(out: &mut String, element: &'a Element, inherited: Option<&'a str>) -> Option<&'a str> {
    out.push('<');
    out.push_str(&element.qualified_name());

    let mut default_ns = inherited;
    if element.prefix().is_none() {
        match element.declared_namespace() {
            Some(declared) => default_ns = Some(declared),
            None => {
                if let Some(ns) = element.namespace_uri() {
                    if inherited != Some(ns) {
                        let _ = write!(out, " xmlns=\"{}\"", escape_attribute(ns));
                    }
                    default_ns = Some(ns);
                }
            }
        }
    } else if let Some(declared) = element.declared_namespace() {
        default_ns = Some(declared);
    }

    for attribute in element.attributes() {
        let _ = write!(
            out,
            " {}=\"{}\"",
            attribute.qualified_name(),
            escape_attribute(attribute.value())
        );
    }
    default_ns
}

fn write_element(out: &mut String, element: &Element, inherited: Option<&str>) {
    let default_ns = write_start(out, element, inherited);

    if element.children().is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in element.children() {
        match child {
            Node::Element(e) => write_element(out, e, default_ns),
            Node::Text(t) => out.push_str(&escape_text(t)),
        }
    }
    out.push_str("</");
    out.push_str(&element.qualified_name());
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nested_namespaces() {
        let iq = Element::builder("iq")
            .attribute("type", "result")
            .attribute("id", "1")
            .child(Element::builder("ping").namespace("urn:xmpp:ping").build())
            .build();
        assert_eq!(
            render(&iq),
            r#"<iq type="result" id="1"><ping xmlns="urn:xmpp:ping"/></iq>"#
        );
    }

    #[test]
    fn test_inherited_namespace_not_repeated() {
        let iq = Element::builder("iq")
            .namespace("jabber:client")
            .attribute("type", "get")
            .build();
        assert_eq!(render_in(&iq, Some("jabber:client")), r#"<iq type="get"/>"#);
        assert_eq!(
            render(&iq),
            r#"<iq xmlns="jabber:client" type="get"/>"#
        );
    }

    #[test]
    fn test_render_escapes() {
        let msg = Element::builder("body")
            .attribute("v", "<\"&'>")
            .text("a < b & c")
            .build();
        assert_eq!(
            render(&msg),
            r#"<body v="&lt;&quot;&amp;'&gt;">a &lt; b &amp; c</body>"#
        );
    }

    #[test]
    fn test_render_open_and_close() {
        let stream = Element::builder("stream:stream")
            .attribute("xmlns", "jabber:client")
            .declare("stream", "http://etherx.jabber.org/streams")
            .attribute("version", "1.0")
            .build();
        assert_eq!(
            render_open(&stream),
            r#"<stream:stream xmlns="jabber:client" xmlns:stream="http://etherx.jabber.org/streams" version="1.0">"#
        );
        assert_eq!(render_close("stream:stream"), "</stream:stream>");
    }
}
