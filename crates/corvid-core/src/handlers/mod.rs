//! Built-in stanza handlers.

pub mod bind;
pub mod dialback;
pub mod generic;
pub mod ping;
pub mod register;
pub mod sasl;
pub mod session_iq;
pub mod stream;
pub mod tls;

use crate::condition::StreamErrorCondition;
use crate::error::ProtocolError;
use crate::handler::HandlerContext;
use crate::jid::Entity;
use corvid_xml::Element;
use std::fmt::Display;

/// Log an internal failure and turn it into a fatal stream error
pub(crate) fn internal_error(err: impl Display) -> ProtocolError {
    tracing::error!("Internal error while handling stanza: {}", err);
    ProtocolError::stream(StreamErrorCondition::InternalServerError)
}

/// Payload child `name` of `stanza` in `namespace`, matched the way the
/// dispatcher matches it: by the child's own `xmlns` first, then by its
/// resolved namespace.
pub(crate) fn iq_payload<'a>(stanza: &'a Element, name: &str, namespace: &str) -> Option<&'a Element> {
    stanza.child_elements().find(|child| {
        child.name() == name
            && (child.declared_namespace() == Some(namespace) || child.namespace_uri() == Some(namespace))
    })
}

/// Whether `stanza` is an iq of `kind` whose payload is `name` in `namespace`
pub(crate) fn is_iq_payload(stanza: &Element, kind: &str, name: &str, namespace: &str) -> bool {
    stanza.name() == "iq"
        && stanza.attribute("type") == Some(kind)
        && iq_payload(stanza, name, namespace).is_some()
}

/// Recipient of `stanza` when it is addressed to someone other than the
/// server itself.
///
/// # Errors
///
/// A malformed `to` is a `bad-request` stanza error.
pub(crate) fn remote_recipient(
    stanza: &Element,
    ctx: &HandlerContext<'_>,
) -> Result<Option<Entity>, ProtocolError> {
    let to = crate::stanza::address(stanza, "to")?;
    Ok(to.filter(|to| to != ctx.server.domain()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::accounts::InMemoryAccounts;
    use crate::context::ServerContext;
    use crate::jid::Entity;
    use crate::relay::{LoopbackConnector, RelayError, StanzaRelay};
    use crate::session::{Session, SessionConfig};
    use crate::state::{SessionState, StreamMode};
    use corvid_crypto::DialbackKey;
    use corvid_xml::Element;
    use std::sync::{Arc, Mutex};

    pub const DOMAIN: &str = "capulet.lit";
    pub const SECRET: &[u8] = b"capulet-secret";

    /// Relay that records deliveries and reports a fixed set of bound entities
    #[derive(Default)]
    pub struct RecordingRelay {
        pub delivered: Mutex<Vec<(Entity, Element)>>,
        pub bound: Mutex<Vec<Entity>>,
    }

    impl StanzaRelay for RecordingRelay {
        fn relay(&self, to: &Entity, stanza: Element) -> Result<(), RelayError> {
            if to.node() == Some("nobody") {
                return Err(RelayError::NotFound(to.to_string()));
            }
            self.delivered.lock().unwrap().push((to.clone(), stanza));
            Ok(())
        }

        fn is_bound(&self, entity: &Entity) -> bool {
            self.bound.lock().unwrap().contains(entity)
        }
    }

    pub fn server_with(config: SessionConfig, relay: Arc<RecordingRelay>) -> ServerContext {
        let accounts = Arc::new(InMemoryAccounts::new());
        accounts
            .add("juliet@capulet.lit".parse().unwrap(), "r0m30")
            .unwrap();
        ServerContext::builder(DOMAIN.parse().unwrap())
            .config(config)
            .dialback_key(DialbackKey::from_secret(SECRET).unwrap())
            .users(accounts.clone())
            .accounts(accounts)
            .relay(relay)
            .connector(Arc::new(LoopbackConnector::new(
                DialbackKey::from_secret(SECRET).unwrap(),
            )))
            .build()
            .unwrap()
    }

    pub fn server() -> ServerContext {
        server_with(
            SessionConfig {
                registration_enabled: true,
                ..SessionConfig::default()
            },
            Arc::new(RecordingRelay::default()),
        )
    }

    /// A session advanced to `state` along the shortest legal path
    pub fn session_in(server: &ServerContext, state: SessionState, mode: StreamMode) -> Session {
        let mut session = server.new_session();
        session.set_mode(mode);
        session.set_stream_id("stream-1".to_string());
        let path: &[SessionState] = match state {
            SessionState::Initiated => &[],
            SessionState::Started => &[SessionState::Started],
            SessionState::EncryptionStarted => {
                &[SessionState::Started, SessionState::EncryptionStarted]
            }
            SessionState::Encrypted => &[
                SessionState::Started,
                SessionState::EncryptionStarted,
                SessionState::Encrypted,
            ],
            SessionState::Authenticated => &[SessionState::Started],
            SessionState::Ended => &[SessionState::Ended],
            SessionState::Closed => &[SessionState::Ended, SessionState::Closed],
        };
        for step in path {
            session.transition_to(*step).unwrap();
        }
        if state == SessionState::Authenticated {
            let entity: Entity = match mode {
                StreamMode::Client => "juliet@capulet.lit".parse().unwrap(),
                StreamMode::Server => "montague.lit".parse().unwrap(),
            };
            if mode == StreamMode::Server {
                session.add_verified_domain("montague.lit");
            }
            session.authenticate(entity).unwrap();
        }
        session
    }
}
