//! Builders for server-generated protocol elements.

use crate::condition::{SaslCondition, StanzaErrorCondition, StanzaErrorType, StreamErrorCondition};
use crate::namespaces::{
    FEATURES_DIALBACK, FEATURES_REGISTER, JABBER_SERVER_DIALBACK, STREAMS, XMPP_BIND, XMPP_SASL,
    XMPP_SESSION, XMPP_STANZAS, XMPP_STREAMS, XMPP_TLS,
};
use crate::state::StreamMode;
use corvid_xml::{Element, Node};

/// Qualified name of the stream root element
pub const STREAM_ELEMENT: &str = "stream:stream";

/// Protocol version announced in stream headers
pub const STREAM_VERSION: &str = "1.0";

/// Build a stream opener.
///
/// The opener is rendered with `render_open`; its close tag is written
/// when the stream ends.
#[must_use]
pub fn stream_opener(
    mode: StreamMode,
    from: &str,
    to: Option<&str>,
    id: Option<&str>,
    lang: Option<&str>,
) -> Element {
    let mut builder = Element::builder(STREAM_ELEMENT)
        .namespace(STREAMS)
        .attribute("xmlns", mode.namespace())
        .declare("stream", STREAMS);
    if mode == StreamMode::Server {
        builder = builder.declare("db", JABBER_SERVER_DIALBACK);
    }
    builder
        .attribute("from", from)
        .attribute_opt("to", to)
        .attribute_opt("id", id)
        .attribute("version", STREAM_VERSION)
        .attribute_opt("xml:lang", lang)
        .build()
}

/// `<stream:features>` containing `features`
#[must_use]
pub fn features(features: Vec<Element>) -> Element {
    Element::builder("stream:features")
        .namespace(STREAMS)
        .nodes(features.into_iter().map(Node::Element))
        .build()
}

/// STARTTLS feature
#[must_use]
pub fn starttls_feature(required: bool) -> Element {
    let mut starttls = Element::builder("starttls").namespace(XMPP_TLS);
    if required {
        starttls = starttls.child(Element::new("required"));
    }
    starttls.build()
}

/// SASL mechanisms feature
#[must_use]
pub fn mechanisms_feature<'a>(names: impl IntoIterator<Item = &'a str>) -> Element {
    let mechanisms = names.into_iter().map(|name| {
        Node::Element(Element::builder("mechanism").text(name).build())
    });
    Element::builder("mechanisms")
        .namespace(XMPP_SASL)
        .nodes(mechanisms)
        .build()
}

/// Resource binding feature
#[must_use]
pub fn bind_feature() -> Element {
    Element::builder("bind").namespace(XMPP_BIND).build()
}

/// Session establishment feature
#[must_use]
pub fn session_feature() -> Element {
    Element::builder("session").namespace(XMPP_SESSION).build()
}

/// Dialback feature
#[must_use]
pub fn dialback_feature() -> Element {
    Element::builder("dialback")
        .namespace(FEATURES_DIALBACK)
        .child(Element::new("errors"))
        .build()
}

/// In-band registration feature
#[must_use]
pub fn register_feature() -> Element {
    Element::builder("register").namespace(FEATURES_REGISTER).build()
}

/// `<stream:error>` with a defined condition
#[must_use]
pub fn stream_error(condition: StreamErrorCondition, text: Option<&str>) -> Element {
    let mut builder = Element::builder("stream:error")
        .namespace(STREAMS)
        .child(Element::builder(condition.as_str()).namespace(XMPP_STREAMS).build());
    if let Some(text) = text {
        builder = builder.child(Element::builder("text").namespace(XMPP_STREAMS).text(text).build());
    }
    builder.build()
}

/// Error reply to `original`.
///
/// The reply keeps the stanza name, id, and payload, swaps `from` and `to`,
/// and appends the `<error/>` child. Returns `None` when `original` is
/// itself an error, which must never be answered.
#[must_use]
pub fn stanza_error(
    original: &Element,
    condition: StanzaErrorCondition,
    kind: StanzaErrorType,
    text: Option<&str>,
) -> Option<Element> {
    if crate::stanza::is_error(original) {
        return None;
    }

    let mut error = Element::builder("error")
        .attribute("type", kind.as_str())
        .child(Element::builder(condition.as_str()).namespace(XMPP_STANZAS).build());
    if let Some(text) = text {
        error = error.child(Element::builder("text").namespace(XMPP_STANZAS).text(text).build());
    }

    let mut reply = Element::builder(original.qualified_name())
        .attribute("type", "error")
        .attribute_opt("id", original.attribute("id"))
        .attribute_opt("from", original.attribute("to"))
        .attribute_opt("to", original.attribute("from"))
        .nodes(original.children().iter().cloned())
        .child(error.build());
    if let Some(ns) = original.namespace_uri() {
        reply = reply.namespace(ns);
    }
    Some(reply.build())
}

/// Empty `type="result"` reply to an iq request, optionally with a payload
#[must_use]
pub fn iq_result(request: &Element, payload: Option<Element>) -> Element {
    let mut builder = Element::builder("iq")
        .attribute("type", "result")
        .attribute_opt("id", request.attribute("id"))
        .attribute_opt("from", request.attribute("to"))
        .attribute_opt("to", request.attribute("from"));
    if let Some(ns) = request.namespace_uri() {
        builder = builder.namespace(ns);
    }
    if let Some(payload) = payload {
        builder = builder.child(payload);
    }
    builder.build()
}

/// `<proceed/>`
#[must_use]
pub fn tls_proceed() -> Element {
    Element::builder("proceed").namespace(XMPP_TLS).build()
}

/// TLS `<failure/>`
#[must_use]
pub fn tls_failure() -> Element {
    Element::builder("failure").namespace(XMPP_TLS).build()
}

/// SASL `<success/>`
#[must_use]
pub fn sasl_success() -> Element {
    Element::builder("success").namespace(XMPP_SASL).build()
}

/// SASL `<failure/>` with a defined condition
#[must_use]
pub fn sasl_failure(condition: SaslCondition) -> Element {
    Element::builder("failure")
        .namespace(XMPP_SASL)
        .child(Element::new(condition.as_str()))
        .build()
}

/// SASL `<challenge/>` carrying base64 data (`=` when empty)
#[must_use]
pub fn sasl_challenge(encoded: &str) -> Element {
    let text = if encoded.is_empty() { "=" } else { encoded };
    Element::builder("challenge").namespace(XMPP_SASL).text(text).build()
}

/// Dialback `<db:result>` or `<db:verify>` carrying a `type`
#[must_use]
pub fn dialback_reply(
    name: &str,
    from: &str,
    to: &str,
    id: Option<&str>,
    valid: bool,
) -> Element {
    Element::builder(format!("db:{name}"))
        .namespace(JABBER_SERVER_DIALBACK)
        .attribute("from", from)
        .attribute("to", to)
        .attribute_opt("id", id)
        .attribute("type", if valid { "valid" } else { "invalid" })
        .build()
}

/// Dialback `<db:verify>` request carrying a key
#[must_use]
pub fn dialback_verify_request(from: &str, to: &str, id: &str, key: &str) -> Element {
    Element::builder("db:verify")
        .namespace(JABBER_SERVER_DIALBACK)
        .attribute("from", from)
        .attribute("to", to)
        .attribute("id", id)
        .text(key)
        .build()
}

/// Dialback `<db:result>` request carrying a key
#[must_use]
pub fn dialback_result_request(from: &str, to: &str, key: &str) -> Element {
    Element::builder("db:result")
        .namespace(JABBER_SERVER_DIALBACK)
        .attribute("from", from)
        .attribute("to", to)
        .text(key)
        .build()
}
