//! Helpers for inspecting the three core stanza kinds.

use crate::condition::StanzaErrorCondition;
use crate::error::ProtocolError;
use crate::jid::Entity;
use crate::namespaces::{JABBER_CLIENT, JABBER_SERVER};
use corvid_xml::Element;

/// The core stanza kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaKind {
    /// `<iq/>`
    Iq,
    /// `<message/>`
    Message,
    /// `<presence/>`
    Presence,
}

impl StanzaKind {
    /// Classify a top-level element; `None` unless it is a core stanza in
    /// `jabber:client` or `jabber:server`
    #[must_use]
    pub fn of(element: &Element) -> Option<Self> {
        if !matches!(element.namespace_uri(), Some(JABBER_CLIENT | JABBER_SERVER)) {
            return None;
        }
        match element.name() {
            "iq" => Some(Self::Iq),
            "message" => Some(Self::Message),
            "presence" => Some(Self::Presence),
            _ => None,
        }
    }

    /// Element name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Iq => "iq",
            Self::Message => "message",
            Self::Presence => "presence",
        }
    }
}

/// The `type` attribute
#[must_use]
pub fn stanza_type(element: &Element) -> Option<&str> {
    element.attribute("type")
}

/// Whether the stanza is itself an error
#[must_use]
pub fn is_error(element: &Element) -> bool {
    stanza_type(element) == Some("error")
}

/// Whether an `iq` is a request (`get` or `set`)
#[must_use]
pub fn is_request(element: &Element) -> bool {
    matches!(stanza_type(element), Some("get" | "set"))
}

/// Parse an address attribute (`to` or `from`).
///
/// # Errors
///
/// A present but malformed address is a `bad-request` stanza error.
pub fn address(element: &Element, attribute: &str) -> Result<Option<Entity>, ProtocolError> {
    element
        .attribute(attribute)
        .map(|raw| {
            raw.parse::<Entity>()
                .map_err(|_| ProtocolError::stanza(StanzaErrorCondition::BadRequest))
        })
        .transpose()
}
