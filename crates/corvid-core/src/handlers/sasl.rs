//! SASL handshake: `auth`, `response`, `abort`.
//!
//! Failures leave the session state unchanged and count against the
//! session's retry budget. Once the budget is spent the next attempt closes
//! the stream with `policy-violation`.

use super::internal_error;
use crate::condition::{SaslCondition, StreamErrorCondition};
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::responses;
use crate::sasl::MechanismStep;
use crate::state::{HandlerKind, SessionState};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use corvid_xml::Element;
use zeroize::Zeroizing;

/// Handles the SASL elements
#[derive(Debug, Default, Clone, Copy)]
pub struct SaslHandler;

/// Decoded payload of `auth` or `response`.
///
/// Empty text means "no data"; a lone `=` means "empty data".
fn decode_payload(element: &Element) -> Result<Option<Zeroizing<Vec<u8>>>, SaslCondition> {
    let text = element.text();
    let text = text.trim();
    match text {
        "" => Ok(None),
        "=" => Ok(Some(Zeroizing::new(Vec::new()))),
        encoded => STANDARD
            .decode(encoded)
            .map(|bytes| Some(Zeroizing::new(bytes)))
            .map_err(|_| SaslCondition::MalformedRequest),
    }
}

impl SaslHandler {
    fn check_budget(ctx: &HandlerContext<'_>) -> Result<(), ProtocolError> {
        if ctx.session.retries().is_exhausted() {
            tracing::warn!(
                session = %ctx.session.id(),
                attempts = ctx.session.retries().attempts(),
                "Authentication retry limit reached"
            );
            return Err(ProtocolError::stream_with_text(
                StreamErrorCondition::PolicyViolation,
                "too many failed authentication attempts",
            ));
        }
        Ok(())
    }

    fn fail(ctx: &mut HandlerContext<'_>, condition: SaslCondition) -> ProtocolError {
        ctx.session.set_pending_mechanism(None);
        let attempts = ctx.session.retries_mut().record_failure();
        tracing::info!(session = %ctx.session.id(), %condition, attempts, "Authentication failed");
        ProtocolError::SaslFailure(condition)
    }

    fn finish(
        ctx: &mut HandlerContext<'_>,
        mechanism: &'static str,
        step: MechanismStep,
    ) -> Result<Vec<Action>, ProtocolError> {
        match step {
            MechanismStep::Success(entity) => {
                ctx.session.authenticate(entity).map_err(internal_error)?;
                Ok(vec![
                    Action::Send(responses::sasl_success()),
                    Action::RestartStream,
                ])
            }
            MechanismStep::Challenge(data) => {
                ctx.session.set_pending_mechanism(Some(mechanism));
                let encoded = STANDARD.encode(data);
                Ok(vec![Action::Send(responses::sasl_challenge(&encoded))])
            }
            MechanismStep::Failure(condition) => Err(Self::fail(ctx, condition)),
        }
    }

    fn auth(stanza: &Element, ctx: &mut HandlerContext<'_>) -> Result<Vec<Action>, ProtocolError> {
        Self::check_budget(ctx)?;

        if ctx.server.config().tls_required && ctx.session.state() != SessionState::Encrypted {
            return Err(ProtocolError::SaslFailure(SaslCondition::EncryptionRequired));
        }

        let server = ctx.server;
        let Some(mechanism) = stanza
            .attribute("mechanism")
            .and_then(|name| server.mechanism(name))
        else {
            return Err(Self::fail(ctx, SaslCondition::InvalidMechanism));
        };

        let payload = match decode_payload(stanza) {
            Ok(payload) => payload,
            Err(condition) => return Err(Self::fail(ctx, condition)),
        };

        let step = mechanism.start(
            payload.as_deref().map(Vec::as_slice),
            server.users(),
            server.domain().domain(),
        );
        Self::finish(ctx, mechanism.name(), step)
    }

    fn response(stanza: &Element, ctx: &mut HandlerContext<'_>) -> Result<Vec<Action>, ProtocolError> {
        Self::check_budget(ctx)?;

        let server = ctx.server;
        let Some(mechanism) = ctx
            .session
            .pending_mechanism()
            .and_then(|name| server.mechanism(name))
        else {
            return Err(Self::fail(ctx, SaslCondition::MalformedRequest));
        };

        let payload = match decode_payload(stanza) {
            Ok(payload) => payload.unwrap_or_default(),
            Err(condition) => return Err(Self::fail(ctx, condition)),
        };

        let step = mechanism.respond(&payload, server.users(), server.domain().domain());
        Self::finish(ctx, mechanism.name(), step)
    }
}

impl StanzaHandler for SaslHandler {
    fn name(&self) -> &'static str {
        "sasl"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Sasl
    }

    fn verify(&self, stanza: &Element) -> bool {
        matches!(stanza.name(), "auth" | "response" | "abort")
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        match stanza.name() {
            "auth" => Self::auth(stanza, ctx),
            "response" => Self::response(stanza, ctx),
            _ => Err(Self::fail(ctx, SaslCondition::Aborted)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{server, server_with, session_in, RecordingRelay};
    use crate::namespaces::XMPP_SASL;
    use crate::session::{Session, SessionConfig};
    use crate::state::StreamMode;
    use std::sync::Arc;

    fn auth(mechanism: &str, payload: &[u8]) -> Element {
        Element::builder("auth")
            .namespace(XMPP_SASL)
            .attribute("mechanism", mechanism)
            .text(&STANDARD.encode(payload))
            .build()
    }

    fn run(
        server: &crate::context::ServerContext,
        session: &mut Session,
        stanza: &Element,
    ) -> Result<Vec<Action>, ProtocolError> {
        let mut ctx = HandlerContext::new(session, server);
        SaslHandler.execute(stanza, &mut ctx)
    }

    #[test]
    fn test_plain_success() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let actions = run(&server, &mut session, &auth("PLAIN", b"\0juliet\0r0m30")).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Send(responses::sasl_success()),
                Action::RestartStream
            ]
        );
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(
            session.authenticated_entity().map(ToString::to_string).as_deref(),
            Some("juliet@capulet.lit")
        );
    }

    #[test]
    fn test_wrong_password_counts() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let err = run(&server, &mut session, &auth("PLAIN", b"\0juliet\0nope")).unwrap_err();
        assert_eq!(err, ProtocolError::SaslFailure(SaslCondition::NotAuthorized));
        assert_eq!(session.state(), SessionState::Started);
        assert_eq!(session.retries().attempts(), 1);
    }

    #[test]
    fn test_retry_exhaustion_is_fatal() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        for _ in 0..3 {
            let err = run(&server, &mut session, &auth("PLAIN", b"\0juliet\0nope")).unwrap_err();
            assert!(!err.is_fatal());
        }
        // correct credentials no longer help
        let err = run(&server, &mut session, &auth("PLAIN", b"\0juliet\0r0m30")).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            ProtocolError::Stream {
                condition: StreamErrorCondition::PolicyViolation,
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Started);
    }

    #[test]
    fn test_success_resets_retries() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        run(&server, &mut session, &auth("PLAIN", b"\0juliet\0nope")).unwrap_err();
        run(&server, &mut session, &auth("PLAIN", b"\0juliet\0r0m30")).unwrap();
        assert_eq!(session.retries().attempts(), 0);
    }

    #[test]
    fn test_invalid_mechanism() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let err = run(&server, &mut session, &auth("X-UNKNOWN", b"x")).unwrap_err();
        assert_eq!(err, ProtocolError::SaslFailure(SaslCondition::InvalidMechanism));
    }

    #[test]
    fn test_bad_base64() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let stanza = Element::builder("auth")
            .namespace(XMPP_SASL)
            .attribute("mechanism", "PLAIN")
            .text("!!not base64!!")
            .build();
        let err = run(&server, &mut session, &stanza).unwrap_err();
        assert_eq!(err, ProtocolError::SaslFailure(SaslCondition::MalformedRequest));
    }

    #[test]
    fn test_encryption_required() {
        let server = server_with(
            SessionConfig {
                tls_available: true,
                tls_required: true,
                ..SessionConfig::default()
            },
            Arc::new(RecordingRelay::default()),
        );
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let err = run(&server, &mut session, &auth("PLAIN", b"\0juliet\0r0m30")).unwrap_err();
        assert_eq!(err, ProtocolError::SaslFailure(SaslCondition::EncryptionRequired));
        assert_eq!(session.state(), SessionState::Started);

        let mut session = session_in(&server, SessionState::Encrypted, StreamMode::Client);
        run(&server, &mut session, &auth("PLAIN", b"\0juliet\0r0m30")).unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_challenge_response() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let bare_auth = Element::builder("auth")
            .namespace(XMPP_SASL)
            .attribute("mechanism", "PLAIN")
            .build();
        let actions = run(&server, &mut session, &bare_auth).unwrap();
        assert_eq!(actions, vec![Action::Send(responses::sasl_challenge(""))]);
        assert_eq!(session.pending_mechanism(), Some("PLAIN"));

        let response = Element::builder("response")
            .namespace(XMPP_SASL)
            .text(&STANDARD.encode(b"\0juliet\0r0m30"))
            .build();
        run(&server, &mut session, &response).unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.pending_mechanism(), None);
    }

    #[test]
    fn test_unexpected_response() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let response = Element::builder("response").namespace(XMPP_SASL).build();
        let err = run(&server, &mut session, &response).unwrap_err();
        assert_eq!(err, ProtocolError::SaslFailure(SaslCondition::MalformedRequest));
    }

    #[test]
    fn test_abort() {
        let server = server();
        let mut session = session_in(&server, SessionState::Started, StreamMode::Client);
        let abort = Element::builder("abort").namespace(XMPP_SASL).build();
        let err = run(&server, &mut session, &abort).unwrap_err();
        assert_eq!(err, ProtocolError::SaslFailure(SaslCondition::Aborted));
        assert_eq!(session.retries().attempts(), 1);
    }
}
