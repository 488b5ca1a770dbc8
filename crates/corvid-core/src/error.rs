//! Error types for the Corvid core protocol.

use crate::condition::{SaslCondition, StanzaErrorCondition, StanzaErrorType, StreamErrorCondition};
use crate::state::SessionState;
use corvid_xml::XmlError;
use std::borrow::Cow;
use thiserror::Error;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// XML framing error
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),

    /// Session error
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] corvid_crypto::CryptoError),

    /// Invalid address
    #[error("invalid address: {0}")]
    Jid(#[from] JidError),
}

/// Session life-cycle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Transition not allowed from the current state
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },

    /// Operation requires a different state
    #[error("operation requires state {expected:?}, session is {actual:?}")]
    WrongState {
        /// Required state
        expected: SessionState,
        /// Current state
        actual: SessionState,
    },

    /// Resource binding requested before authentication
    #[error("session is not authenticated")]
    NotAuthenticated,
}

/// Address parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JidError {
    /// A part that must not be empty is empty
    #[error("empty {0} part")]
    EmptyPart(&'static str),

    /// A part exceeds the length limit
    #[error("{0} part too long")]
    TooLong(&'static str),

    /// A part contains a forbidden character
    #[error("invalid character in {0} part")]
    InvalidCharacter(&'static str),

    /// The address failed stringprep normalization
    #[error("invalid address: {0}")]
    Invalid(String),
}

/// Protocol errors raised while processing one stanza.
///
/// The session driver turns each variant into the matching wire response;
/// [`ProtocolError::is_fatal`] decides whether the stream is closed after it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Malformed XML on the stream
    #[error("framing error: {0}")]
    Framing(#[from] XmlError),

    /// The session state does not admit the selected handler
    #[error("{handler} not allowed in state {state:?}")]
    UnsupportedInState {
        /// Current session state
        state: SessionState,
        /// Name of the rejected handler
        handler: &'static str,
    },

    /// No handler is registered for the element
    #[error("no handler for <{name}> in namespace {namespace:?}")]
    NoHandler {
        /// Element local name
        name: String,
        /// Element namespace
        namespace: Option<String>,
    },

    /// SASL negotiation failed; the client may retry
    #[error("sasl failure: {0}")]
    SaslFailure(SaslCondition),

    /// A stanza arrived after the session ended
    #[error("session already ended")]
    SessionEnded,

    /// Stream-level error; the stream is closed after reporting it
    #[error("stream error: {condition}")]
    Stream {
        /// Defined condition
        condition: StreamErrorCondition,
        /// Optional human-readable text
        text: Option<Cow<'static, str>>,
    },

    /// Stanza-level error returned to the sender
    #[error("stanza error: {condition}")]
    Stanza {
        /// Defined condition
        condition: StanzaErrorCondition,
        /// Error type
        kind: StanzaErrorType,
        /// Optional human-readable text
        text: Option<Cow<'static, str>>,
    },
}

impl ProtocolError {
    /// Stream error without text
    #[must_use]
    pub fn stream(condition: StreamErrorCondition) -> Self {
        Self::Stream {
            condition,
            text: None,
        }
    }

    /// Stream error with explanatory text
    pub fn stream_with_text(
        condition: StreamErrorCondition,
        text: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::Stream {
            condition,
            text: Some(text.into()),
        }
    }

    /// Stanza error with the condition's default type
    #[must_use]
    pub fn stanza(condition: StanzaErrorCondition) -> Self {
        Self::Stanza {
            condition,
            kind: condition.default_type(),
            text: None,
        }
    }

    /// Stanza error with explanatory text
    pub fn stanza_with_text(
        condition: StanzaErrorCondition,
        kind: StanzaErrorType,
        text: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::Stanza {
            condition,
            kind,
            text: Some(text.into()),
        }
    }

    /// Whether the stream must be closed after reporting this error.
    ///
    /// `NoHandler` is reported as fatal here; callers that want to answer
    /// with an error reply instead can match on it first.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Framing(_) | Self::SessionEnded | Self::Stream { .. } | Self::NoHandler { .. } => {
                true
            }
            Self::UnsupportedInState { .. } | Self::SaslFailure(_) | Self::Stanza { .. } => false,
        }
    }
}

/// Result type alias using the core protocol error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(ProtocolError::Framing(XmlError::InvalidUtf8).is_fatal());
        assert!(ProtocolError::stream(StreamErrorCondition::PolicyViolation).is_fatal());
        assert!(ProtocolError::SessionEnded.is_fatal());
        assert!(!ProtocolError::SaslFailure(SaslCondition::NotAuthorized).is_fatal());
        assert!(!ProtocolError::stanza(StanzaErrorCondition::ServiceUnavailable).is_fatal());
        assert!(
            !ProtocolError::UnsupportedInState {
                state: SessionState::Started,
                handler: "iq"
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_stanza_default_type() {
        let ProtocolError::Stanza { kind, .. } = ProtocolError::stanza(StanzaErrorCondition::UnknownSender)
        else {
            panic!("expected stanza error");
        };
        assert_eq!(kind, StanzaErrorType::Modify);
    }

    #[test]
    fn test_error_display() {
        let err = Error::from(ProtocolError::NoHandler {
            name: "query".to_string(),
            namespace: Some("urn:x".to_string()),
        });
        assert!(err.to_string().contains("<query>"));
    }
}
