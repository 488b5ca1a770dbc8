//! The handler seam.
//!
//! Handlers are stateless; everything they change lives in the
//! [`Session`] they are handed. What they want written, routed, or done
//! to the transport comes back as a list of [`Action`]s, which the
//! session driver applies in order.

use crate::context::ServerContext;
use crate::error::ProtocolError;
use crate::jid::Entity;
use crate::relay::DialbackRequest;
use crate::session::Session;
use crate::state::HandlerKind;
use corvid_xml::Element;

/// Side effect requested by a handler
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write an element to the peer
    Send(Element),
    /// Write a stream opener (start tag only)
    OpenStream(Element),
    /// Deliver a stanza to another entity
    Route {
        /// Recipient
        to: Entity,
        /// Stanza with `from` already stamped
        stanza: Element,
    },
    /// Discard parser state; the peer opens a new stream
    RestartStream,
    /// Hand the connection to the TLS layer
    StartTls,
    /// Ask the authoritative server to verify a dialback key
    VerifyDialback(DialbackRequest),
    /// A resource was bound; the server should register the session
    Bound(Entity),
    /// Close the stream and the connection
    Close,
}

/// What a handler may touch while executing
pub struct HandlerContext<'a> {
    /// Session the stanza arrived on
    pub session: &'a mut Session,
    /// Shared server state
    pub server: &'a ServerContext,
}

impl<'a> HandlerContext<'a> {
    /// Bundle a session with the server
    pub fn new(session: &'a mut Session, server: &'a ServerContext) -> Self {
        Self { session, server }
    }
}

/// Processes one kind of top-level element
pub trait StanzaHandler: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Category used for state admission
    fn kind(&self) -> HandlerKind;

    /// Whether this handler accepts `stanza`; only consulted for handlers
    /// registered in a namespace dictionary
    fn verify(&self, stanza: &Element) -> bool;

    /// Process `stanza`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] the driver turns into a stream or stanza
    /// error response.
    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError>;
}
