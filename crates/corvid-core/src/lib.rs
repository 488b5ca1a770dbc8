//! # Corvid Core
//!
//! Core protocol implementation for the Corvid messaging server.
//!
//! This crate provides:
//! - Session state machine (stream negotiation, encryption, authentication)
//! - Namespace-keyed stanza dispatch with per-state admission
//! - SASL `PLAIN` and server dialback handshakes
//! - Resource binding, in-band registration, ping
//! - A session driver turning raw bytes into wire output
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SessionDriver                              │
//! │   (one per connection: decoder, session, output)                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                 worker::process + Dispatcher                     │
//! │   (handler lookup, state admission, sender checks)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     StanzaHandler impls                          │
//! │   (stream, tls, sasl, dialback, bind, register, ping, ...)      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                       ServerContext                              │
//! │   (domain, config, mechanisms, accounts, relay, connector)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod accounts;
pub mod condition;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod jid;
pub mod namespaces;
pub mod relay;
pub mod responses;
pub mod sasl;
pub mod session;
pub mod stanza;
pub mod state;
pub mod worker;

pub use accounts::{AccountError, AccountManagement, InMemoryAccounts, UserAuthentication};
pub use condition::{SaslCondition, StanzaErrorCondition, StanzaErrorType, StreamErrorCondition};
pub use context::{ServerContext, ServerContextBuilder};
pub use dispatch::{Dispatcher, NamespaceDictionary};
pub use driver::{Output, SessionDriver};
pub use error::{Error, JidError, ProtocolError, Result, SessionError};
pub use handler::{Action, HandlerContext, StanzaHandler};
pub use self::jid::Entity;
pub use relay::{
    ConnectorError, DialbackRequest, DialbackVerdict, LoopbackConnector, NoConnector, NullRelay,
    RelayError, ServerConnector, StanzaRelay, VerdictReceiver,
};
pub use sasl::{MechanismStep, RetryCounter, SaslMechanism};
pub use session::{Session, SessionConfig, SessionId, SessionStats};
pub use stanza::StanzaKind;
pub use state::{HandlerKind, SessionState, StreamDirection, StreamMode};
