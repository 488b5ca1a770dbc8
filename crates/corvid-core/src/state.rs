//! Session states and per-state handler admission.
//!
//! ```text
//! Initiated ─▶ Started ─▶ EncryptionStarted ─▶ Encrypted ─▶ Authenticated ─▶ Ended ─▶ Closed
//!                 │                                              ▲
//!                 └──────────── (encryption not required) ───────┘
//! ```
//!
//! Authentication failures leave the state where it was; the client retries
//! inside the same state. Any live state may move to `Ended`.

use serde::{Deserialize, Serialize};

/// Session state, totally ordered by protocol progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Connection accepted, no stream header yet
    Initiated,
    /// Stream header exchanged
    Started,
    /// `<proceed/>` sent, waiting for the transport to finish TLS
    EncryptionStarted,
    /// Transport reports encryption established
    Encrypted,
    /// SASL or dialback succeeded
    Authenticated,
    /// Stream end received or sent
    Ended,
    /// Connection released
    Closed,
}

impl SessionState {
    /// Whether the machine may move from `self` to `to`
    #[must_use]
    pub fn can_transition(&self, to: SessionState) -> bool {
        use SessionState::{
            Authenticated, Closed, Encrypted, EncryptionStarted, Ended, Initiated, Started,
        };
        matches!(
            (*self, to),
            (Initiated, Started)
                | (Started, EncryptionStarted)
                | (Started, Authenticated)
                | (EncryptionStarted, Encrypted)
                | (Encrypted, Authenticated)
                | (Initiated | Started | EncryptionStarted | Encrypted | Authenticated, Ended)
                | (Ended, Closed)
        )
    }

    /// Whether stanzas may still be submitted
    #[must_use]
    pub fn is_live(&self) -> bool {
        *self < SessionState::Ended
    }

    /// Whether a handler of `kind` may execute in this state.
    ///
    /// `Ended` and `Closed` admit nothing; submitting a stanza there is a
    /// caller error reported as [`crate::ProtocolError::SessionEnded`].
    #[must_use]
    pub fn admits(&self, kind: HandlerKind, mode: StreamMode) -> bool {
        use HandlerKind::{Dialback, Prolog, Registration, Sasl, Stanza, StartTls, StreamStart};
        let s2s = mode == StreamMode::Server;
        match self {
            SessionState::Initiated => matches!(kind, Prolog | StreamStart),
            SessionState::Started => match kind {
                StartTls | Registration | Sasl => true,
                Dialback => s2s,
                _ => false,
            },
            SessionState::EncryptionStarted => false,
            SessionState::Encrypted => match kind {
                StreamStart | Sasl | Registration => true,
                Dialback => s2s,
                _ => false,
            },
            SessionState::Authenticated => match kind {
                StreamStart | Stanza | Registration => true,
                Dialback => s2s,
                _ => false,
            },
            SessionState::Ended | SessionState::Closed => false,
        }
    }
}

/// Handler categories used for admission decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// `<?xml ...?>` declaration
    Prolog,
    /// `<stream:stream>` header
    StreamStart,
    /// STARTTLS negotiation
    StartTls,
    /// In-band account registration
    Registration,
    /// SASL `auth` / `response` / `abort`
    Sasl,
    /// Server dialback `result` / `verify`
    Dialback,
    /// `iq`, `message`, `presence` and their payload handlers
    Stanza,
}

/// Which side of the federation a stream serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Client-to-server (`jabber:client`)
    #[default]
    Client,
    /// Server-to-server (`jabber:server`)
    Server,
}

impl StreamMode {
    /// Default namespace of stanzas on this kind of stream
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Client => crate::namespaces::JABBER_CLIENT,
            Self::Server => crate::namespaces::JABBER_SERVER,
        }
    }

    /// Mode matching a stream's default namespace
    #[must_use]
    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            crate::namespaces::JABBER_CLIENT => Some(Self::Client),
            crate::namespaces::JABBER_SERVER => Some(Self::Server),
            _ => None,
        }
    }
}

/// Who opened the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
    /// The peer connected to us
    #[default]
    Inbound,
    /// We connected to the peer
    Outbound,
}
