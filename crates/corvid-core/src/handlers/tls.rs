//! STARTTLS negotiation.
//!
//! The handshake itself belongs to the transport; this handler only moves
//! the session to `EncryptionStarted` and tells the driver to hand the
//! connection over.

use super::internal_error;
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::responses;
use crate::state::{HandlerKind, SessionState};
use corvid_xml::Element;

/// Handles `<starttls/>`
#[derive(Debug, Default, Clone, Copy)]
pub struct StartTlsHandler;

impl StanzaHandler for StartTlsHandler {
    fn name(&self) -> &'static str {
        "starttls"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::StartTls
    }

    fn verify(&self, stanza: &Element) -> bool {
        stanza.name() == "starttls"
    }

    fn execute(
        &self,
        _stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if !ctx.server.config().tls_available {
            tracing::warn!(session = %ctx.session.id(), "STARTTLS requested but TLS is not available");
            return Ok(vec![Action::Send(responses::tls_failure()), Action::Close]);
        }

        ctx.session
            .transition_to(SessionState::EncryptionStarted)
            .map_err(internal_error)?;
        Ok(vec![Action::Send(responses::tls_proceed()), Action::StartTls])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{server, server_with, session_in, RecordingRelay};
    use crate::namespaces::XMPP_TLS;
    use crate::session::SessionConfig;
    use crate::state::StreamMode;
    use std::sync::Arc;

    fn starttls() -> Element {
        Element::builder("starttls").namespace(XMPP_TLS).build()
    }

    #[test]
    fn test_proceed() {
        let server = server_with(
            SessionConfig {
                tls_available: true,
                ..SessionConfig::default()
            },
            Arc::new(RecordingRelay::default()),
        );
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let mut ctx = HandlerContext::new(&mut session, &server);
        let actions = StartTlsHandler.execute(&starttls(), &mut ctx).unwrap();
        assert_eq!(
            actions,
            vec![Action::Send(responses::tls_proceed()), Action::StartTls]
        );
        assert_eq!(session.state(), SessionState::EncryptionStarted);
    }

    #[test]
    fn test_failure_without_tls() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let mut ctx = HandlerContext::new(&mut session, &server);
        let actions = StartTlsHandler.execute(&starttls(), &mut ctx).unwrap();
        assert_eq!(
            actions,
            vec![Action::Send(responses::tls_failure()), Action::Close]
        );
        assert_eq!(session.state(), SessionState::Started);
    }
}
