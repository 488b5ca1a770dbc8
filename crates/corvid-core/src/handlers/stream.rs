//! Prolog and stream header handling.

use super::internal_error;
use crate::condition::StreamErrorCondition;
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::namespaces::STREAMS;
use crate::responses;
use crate::state::{HandlerKind, SessionState, StreamMode};
use corvid_xml::Element;

/// Accepts the `<?xml ...?>` declaration
#[derive(Debug, Default, Clone, Copy)]
pub struct PrologHandler;

impl StanzaHandler for PrologHandler {
    fn name(&self) -> &'static str {
        "prolog"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Prolog
    }

    fn verify(&self, stanza: &Element) -> bool {
        stanza.name() == "xml"
    }

    fn execute(
        &self,
        stanza: &Element,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if let Some(version) = stanza.attribute("version") {
            if version != "1.0" {
                tracing::debug!(version, "Peer declared unusual XML version");
            }
        }
        Ok(Vec::new())
    }
}

/// Answers `<stream:stream>` with a stream header and features
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamStartHandler;

impl StreamStartHandler {
    fn check_version(stanza: &Element) -> Result<(), ProtocolError> {
        let Some(version) = stanza.attribute("version") else {
            return Ok(());
        };
        let major = version.split('.').next().and_then(|m| m.trim().parse::<u32>().ok());
        match major {
            Some(1) => Ok(()),
            _ => Err(ProtocolError::stream_with_text(
                StreamErrorCondition::UnsupportedVersion,
                format!("version {version} not supported"),
            )),
        }
    }

    fn features(ctx: &HandlerContext<'_>) -> Vec<Element> {
        let config = ctx.server.config();
        let mode = ctx.session.mode();
        let registration = config.registration_enabled && ctx.server.accounts().is_some();
        let mut features = Vec::new();

        match ctx.session.state() {
            SessionState::Initiated | SessionState::Started => {
                if config.tls_available {
                    features.push(responses::starttls_feature(config.tls_required));
                }
                match mode {
                    StreamMode::Client => {
                        features.push(responses::mechanisms_feature(ctx.server.mechanism_names()));
                    }
                    StreamMode::Server if config.dialback_enabled => {
                        features.push(responses::dialback_feature());
                    }
                    StreamMode::Server => {}
                }
            }
            SessionState::Encrypted => match mode {
                StreamMode::Client => {
                    features.push(responses::mechanisms_feature(ctx.server.mechanism_names()));
                    if registration {
                        features.push(responses::register_feature());
                    }
                }
                StreamMode::Server if config.dialback_enabled => {
                    features.push(responses::dialback_feature());
                }
                StreamMode::Server => {}
            },
            SessionState::Authenticated => {
                if mode == StreamMode::Client {
                    features.push(responses::bind_feature());
                    features.push(responses::session_feature());
                }
            }
            SessionState::EncryptionStarted | SessionState::Ended | SessionState::Closed => {}
        }
        features
    }
}

impl StanzaHandler for StreamStartHandler {
    fn name(&self) -> &'static str {
        "stream-start"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::StreamStart
    }

    fn verify(&self, stanza: &Element) -> bool {
        stanza.name() == "stream"
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if stanza.namespace_uri() != Some(STREAMS) {
            return Err(ProtocolError::stream_with_text(
                StreamErrorCondition::InvalidNamespace,
                "stream element must be in the streams namespace",
            ));
        }

        let mode = stanza
            .declared_namespace()
            .and_then(StreamMode::from_namespace)
            .ok_or_else(|| {
                ProtocolError::stream_with_text(
                    StreamErrorCondition::InvalidNamespace,
                    "default namespace must be jabber:client or jabber:server",
                )
            })?;

        Self::check_version(stanza)?;

        let domain = ctx.server.domain().domain();
        let to = stanza.attribute("to");
        let addressed_here = to.is_some_and(|to| to.eq_ignore_ascii_case(domain));
        match mode {
            StreamMode::Client if !addressed_here => {
                return Err(ProtocolError::stream(StreamErrorCondition::HostUnknown));
            }
            StreamMode::Server if to.is_some() && !addressed_here => {
                return Err(ProtocolError::stream(StreamErrorCondition::HostUnknown));
            }
            _ => {}
        }

        let stream_id = corvid_crypto::random::stream_id().map_err(internal_error)?;
        let lang = stanza.qualified_attribute("xml:lang").map(str::to_string);

        let session = &mut *ctx.session;
        session.set_mode(mode);
        session.set_stream_id(stream_id.clone());
        session.set_xml_lang(lang.clone());
        if session.state() == SessionState::Initiated {
            session
                .transition_to(SessionState::Started)
                .map_err(internal_error)?;
        }

        tracing::debug!(
            session = %session.id(),
            ?mode,
            state = ?session.state(),
            "Stream opened"
        );

        let opener = responses::stream_opener(
            mode,
            domain,
            stanza.attribute("from"),
            Some(&stream_id),
            lang.as_deref(),
        );
        let features = responses::features(Self::features(ctx));
        Ok(vec![Action::OpenStream(opener), Action::Send(features)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{server, server_with, session_in, RecordingRelay, DOMAIN};
    use crate::namespaces::{JABBER_CLIENT, JABBER_SERVER, XMPP_BIND, XMPP_SASL, XMPP_TLS};
    use crate::session::SessionConfig;
    use std::sync::Arc;

    fn header(default_ns: &str, to: Option<&str>, version: Option<&str>) -> Element {
        Element::builder("stream:stream")
            .namespace(STREAMS)
            .attribute("xmlns", default_ns)
            .declare("stream", STREAMS)
            .attribute_opt("to", to)
            .attribute_opt("version", version)
            .build()
    }

    fn run(
        server: &crate::context::ServerContext,
        session: &mut crate::session::Session,
        stanza: &Element,
    ) -> Result<Vec<Action>, ProtocolError> {
        let mut ctx = HandlerContext::new(session, server);
        StreamStartHandler.execute(stanza, &mut ctx)
    }

    fn features_of(actions: &[Action]) -> &Element {
        match &actions[1] {
            Action::Send(features) => features,
            other => panic!("expected features, got {other:?}"),
        }
    }

    #[test]
    fn test_client_stream_start() {
        let server = server();
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        let actions = run(&server, &mut session, &header(JABBER_CLIENT, Some(DOMAIN), Some("1.0"))).unwrap();

        assert_eq!(session.state(), SessionState::Started);
        assert_eq!(session.mode(), StreamMode::Client);
        let Action::OpenStream(opener) = &actions[0] else {
            panic!("expected opener");
        };
        assert_eq!(opener.attribute("from"), Some(DOMAIN));
        assert_eq!(opener.attribute("version"), Some("1.0"));
        assert_eq!(opener.attribute("id"), session.stream_id());

        let features = features_of(&actions);
        assert!(features.child_ns("mechanisms", XMPP_SASL).is_some());
        assert!(features.child_ns("starttls", XMPP_TLS).is_none());
    }

    #[test]
    fn test_starttls_offered_when_available() {
        let server = server_with(
            SessionConfig {
                tls_available: true,
                tls_required: true,
                ..SessionConfig::default()
            },
            Arc::new(RecordingRelay::default()),
        );
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        let actions = run(&server, &mut session, &header(JABBER_CLIENT, Some(DOMAIN), None)).unwrap();
        let starttls = features_of(&actions).child_ns("starttls", XMPP_TLS).unwrap();
        assert!(starttls.child("required").is_some());
    }

    #[test]
    fn test_authenticated_restart_offers_bind() {
        let server = server();
        let mut session = session_in(&server, SessionState::Authenticated, StreamMode::Client);
        let actions = run(&server, &mut session, &header(JABBER_CLIENT, Some(DOMAIN), Some("1.0"))).unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
        let features = features_of(&actions);
        assert!(features.child_ns("bind", XMPP_BIND).is_some());
        assert!(features.child_ns("mechanisms", XMPP_SASL).is_none());
    }

    #[test]
    fn test_server_stream_offers_dialback() {
        let server = server();
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        let actions = run(&server, &mut session, &header(JABBER_SERVER, None, Some("1.0"))).unwrap();
        assert_eq!(session.mode(), StreamMode::Server);
        let features = features_of(&actions);
        assert!(features.child("dialback").is_some());
        assert!(features.child("mechanisms").is_none());
    }

    #[test]
    fn test_unknown_host() {
        let server = server();
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        let err = run(&server, &mut session, &header(JABBER_CLIENT, Some("montague.lit"), None)).unwrap_err();
        assert_eq!(err, ProtocolError::stream(StreamErrorCondition::HostUnknown));
        assert_eq!(session.state(), SessionState::Initiated);
    }

    #[test]
    fn test_host_match_is_case_insensitive() {
        let server = server();
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        assert!(run(&server, &mut session, &header(JABBER_CLIENT, Some("Capulet.LIT"), None)).is_ok());
    }

    #[test]
    fn test_invalid_default_namespace() {
        let server = server();
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        let err = run(&server, &mut session, &header("urn:bogus", Some(DOMAIN), None)).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Stream {
                condition: StreamErrorCondition::InvalidNamespace,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_stream_namespace() {
        let server = server();
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        let stanza = Element::builder("stream:stream")
            .namespace("urn:not-streams")
            .attribute("xmlns", JABBER_CLIENT)
            .attribute("to", DOMAIN)
            .build();
        let err = run(&server, &mut session, &stanza).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Stream {
                condition: StreamErrorCondition::InvalidNamespace,
                ..
            }
        ));
    }

    #[test]
    fn test_versions() {
        let server = server();
        for (version, ok) in [("1.0", true), ("1.5", true), ("2.0", false), ("x", false)] {
            let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
            let result = run(&server, &mut session, &header(JABBER_CLIENT, Some(DOMAIN), Some(version)));
            assert_eq!(result.is_ok(), ok, "version {version}");
        }
    }

    #[test]
    fn test_prolog_produces_nothing() {
        let server = server();
        let mut session = session_in(&server, SessionState::Initiated, StreamMode::Client);
        let mut ctx = HandlerContext::new(&mut session, &server);
        let prolog = Element::builder("xml").attribute("version", "1.0").build();
        assert!(PrologHandler.execute(&prolog, &mut ctx).unwrap().is_empty());
    }
}
