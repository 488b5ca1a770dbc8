//! Handler lookup for top-level elements.
//!
//! Lookup order:
//!
//! 1. `<?xml?>` goes to the prolog handler, `<stream>` to the stream start
//!    handler.
//! 2. `iq`, `message`, `presence` in `jabber:client` or `jabber:server`:
//!    an `iq` with exactly one child element is looked up by the child's
//!    namespace, falling back to the service-unavailable handler; any other
//!    `iq` goes to the generic iq handler; `message` and `presence` go to
//!    their generic handlers.
//! 3. Anything else is looked up by its own namespace.
//!
//! Within a namespace dictionary the first handler whose `verify` accepts
//! the element wins.

use crate::handler::StanzaHandler;
use crate::handlers::{
    bind::BindHandler,
    dialback::{DbResultHandler, DbVerifyHandler},
    generic::{IqHandler, MessageHandler, PresenceHandler, ServiceUnavailableHandler},
    ping::PingHandler,
    register::RegisterHandler,
    sasl::SaslHandler,
    session_iq::SessionIqHandler,
    stream::{PrologHandler, StreamStartHandler},
    tls::StartTlsHandler,
};
use crate::namespaces::{
    JABBER_IQ_REGISTER, JABBER_SERVER_DIALBACK, XMPP_BIND, XMPP_PING, XMPP_SASL, XMPP_SESSION,
    XMPP_TLS,
};
use crate::session::SessionConfig;
use crate::stanza::StanzaKind;
use corvid_xml::Element;
use std::collections::HashMap;

/// Handlers registered for one namespace
#[derive(Default)]
pub struct NamespaceDictionary {
    handlers: Vec<Box<dyn StanzaHandler>>,
}

impl NamespaceDictionary {
    /// Add a handler; earlier handlers take precedence
    pub fn register(&mut self, handler: Box<dyn StanzaHandler>) {
        self.handlers.push(handler);
    }

    /// First handler accepting `stanza`
    #[must_use]
    pub fn get(&self, stanza: &Element) -> Option<&dyn StanzaHandler> {
        self.handlers
            .iter()
            .map(AsRef::as_ref)
            .find(|h| h.verify(stanza))
    }

    /// Number of handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Maps top-level elements to handlers
pub struct Dispatcher {
    dictionaries: HashMap<String, NamespaceDictionary>,
    prolog: Box<dyn StanzaHandler>,
    stream_start: Box<dyn StanzaHandler>,
    iq: Box<dyn StanzaHandler>,
    message: Box<dyn StanzaHandler>,
    presence: Box<dyn StanzaHandler>,
    service_unavailable: Box<dyn StanzaHandler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher with only the built-in stream and generic stanza handlers
    #[must_use]
    pub fn new() -> Self {
        Self {
            dictionaries: HashMap::new(),
            prolog: Box::new(PrologHandler),
            stream_start: Box::new(StreamStartHandler),
            iq: Box::new(IqHandler),
            message: Box::new(MessageHandler),
            presence: Box::new(PresenceHandler),
            service_unavailable: Box::new(ServiceUnavailableHandler),
        }
    }

    /// Dispatcher with every protocol handler enabled by `config`
    #[must_use]
    pub fn with_defaults(config: &SessionConfig) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(XMPP_TLS, Box::new(StartTlsHandler));
        dispatcher.register(XMPP_SASL, Box::new(SaslHandler));
        dispatcher.register(XMPP_BIND, Box::new(BindHandler));
        dispatcher.register(XMPP_SESSION, Box::new(SessionIqHandler));
        dispatcher.register(XMPP_PING, Box::new(PingHandler));
        if config.dialback_enabled {
            dispatcher.register(JABBER_SERVER_DIALBACK, Box::new(DbResultHandler));
            dispatcher.register(JABBER_SERVER_DIALBACK, Box::new(DbVerifyHandler));
        }
        if config.registration_enabled {
            dispatcher.register(JABBER_IQ_REGISTER, Box::new(RegisterHandler));
        }
        dispatcher
    }

    /// Register `handler` for elements (or iq payloads) in `namespace`
    pub fn register(&mut self, namespace: &str, handler: Box<dyn StanzaHandler>) {
        tracing::trace!(namespace, handler = handler.name(), "Registering handler");
        self.dictionaries
            .entry(namespace.to_string())
            .or_default()
            .register(handler);
    }

    /// Whether any handler is registered for `namespace`
    #[must_use]
    pub fn handles_namespace(&self, namespace: &str) -> bool {
        self.dictionaries.contains_key(namespace)
    }

    /// Select the handler for `stanza`, or `None` if nothing handles it
    #[must_use]
    pub fn lookup(&self, stanza: &Element) -> Option<&dyn StanzaHandler> {
        if stanza.name() == "xml" && stanza.prefix().is_none() {
            return Some(self.prolog.as_ref());
        }
        if stanza.name() == "stream" {
            return Some(self.stream_start.as_ref());
        }

        match StanzaKind::of(stanza) {
            Some(StanzaKind::Iq) => Some(self.lookup_iq(stanza)),
            Some(StanzaKind::Message) => Some(self.message.as_ref()),
            Some(StanzaKind::Presence) => Some(self.presence.as_ref()),
            None => self.lookup_namespace(stanza.namespace_uri(), stanza),
        }
    }

    fn lookup_iq(&self, iq: &Element) -> &dyn StanzaHandler {
        let mut children = iq.child_elements();
        let (Some(payload), None) = (children.next(), children.next()) else {
            return self.iq.as_ref();
        };

        payload
            .declared_namespace()
            .and_then(|ns| self.lookup_namespace(Some(ns), iq))
            .or_else(|| self.lookup_namespace(payload.namespace_uri(), iq))
            .unwrap_or(self.service_unavailable.as_ref())
    }

    fn lookup_namespace(&self, namespace: Option<&str>, stanza: &Element) -> Option<&dyn StanzaHandler> {
        self.dictionaries.get(namespace?)?.get(stanza)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::{JABBER_CLIENT, STREAMS};

    fn dispatcher() -> Dispatcher {
        Dispatcher::with_defaults(&SessionConfig {
            registration_enabled: true,
            ..SessionConfig::default()
        })
    }

    fn iq_with(children: Vec<Element>) -> Element {
        iq_of("get", children)
    }

    fn iq_of(kind: &str, children: Vec<Element>) -> Element {
        let mut iq = Element::builder("iq")
            .namespace(JABBER_CLIENT)
            .attribute("type", kind)
            .attribute("id", "1");
        for child in children {
            iq = iq.child(child);
        }
        iq.build()
    }

    fn name_of(d: &Dispatcher, el: &Element) -> Option<&'static str> {
        d.lookup(el).map(StanzaHandler::name)
    }

    #[test]
    fn test_stream_elements() {
        let d = dispatcher();
        let prolog = Element::builder("xml").attribute("version", "1.0").build();
        let stream = Element::builder("stream:stream").namespace(STREAMS).build();
        assert_eq!(name_of(&d, &prolog), Some("prolog"));
        assert_eq!(name_of(&d, &stream), Some("stream-start"));
    }

    #[test]
    fn test_iq_payload_lookup() {
        let d = dispatcher();
        let ping = iq_with(vec![Element::builder("ping").namespace(XMPP_PING).build()]);
        assert_eq!(name_of(&d, &ping), Some("ping"));

        let bind = iq_of("set", vec![Element::builder("bind").namespace(XMPP_BIND).build()]);
        assert_eq!(name_of(&d, &bind), Some("bind"));

        let bind_get = iq_with(vec![Element::builder("bind").namespace(XMPP_BIND).build()]);
        assert_eq!(name_of(&d, &bind_get), Some("service-unavailable"));
    }

    #[test]
    fn test_declared_namespace_preferred() {
        let d = dispatcher();
        let mut payload = Element::builder("ping")
            .attribute("xmlns", XMPP_PING)
            .build();
        payload.set_namespace_uri(Some("urn:elsewhere".to_string()));
        let iq = iq_with(vec![payload]);
        assert_eq!(name_of(&d, &iq), Some("ping"));

        let mut payload = Element::builder("bind")
            .attribute("xmlns", XMPP_BIND)
            .build();
        payload.set_namespace_uri(Some("urn:elsewhere".to_string()));
        let iq = iq_of("set", vec![payload]);
        assert_eq!(name_of(&d, &iq), Some("bind"));
    }

    #[test]
    fn test_unknown_iq_payload_is_service_unavailable() {
        let d = dispatcher();
        let iq = iq_with(vec![Element::builder("query").namespace("urn:unknown").build()]);
        assert_eq!(name_of(&d, &iq), Some("service-unavailable"));
    }

    #[test]
    fn test_iq_without_single_child_is_generic() {
        let d = dispatcher();
        assert_eq!(name_of(&d, &iq_with(vec![])), Some("iq"));
        let two = iq_with(vec![
            Element::builder("ping").namespace(XMPP_PING).build(),
            Element::builder("ping").namespace(XMPP_PING).build(),
        ]);
        assert_eq!(name_of(&d, &two), Some("iq"));
    }

    #[test]
    fn test_message_and_presence() {
        let d = dispatcher();
        let message = Element::builder("message").namespace(JABBER_CLIENT).build();
        let presence = Element::builder("presence").namespace(JABBER_CLIENT).build();
        assert_eq!(name_of(&d, &message), Some("message"));
        assert_eq!(name_of(&d, &presence), Some("presence"));
    }

    #[test]
    fn test_core_names_in_other_namespace_are_not_stanzas() {
        let d = dispatcher();
        let message = Element::builder("message").namespace("urn:other").build();
        assert_eq!(name_of(&d, &message), None);
    }

    #[test]
    fn test_namespace_lookup() {
        let d = dispatcher();
        let starttls = Element::builder("starttls").namespace(XMPP_TLS).build();
        let auth = Element::builder("auth").namespace(XMPP_SASL).build();
        let result = Element::builder("db:result")
            .namespace(JABBER_SERVER_DIALBACK)
            .build();
        let verify = Element::builder("db:verify")
            .namespace(JABBER_SERVER_DIALBACK)
            .build();
        assert_eq!(name_of(&d, &starttls), Some("starttls"));
        assert_eq!(name_of(&d, &auth), Some("sasl"));
        assert_eq!(name_of(&d, &result), Some("db-result"));
        assert_eq!(name_of(&d, &verify), Some("db-verify"));
    }

    #[test]
    fn test_unverified_element_has_no_handler() {
        let d = dispatcher();
        let unknown = Element::builder("bogus").namespace(XMPP_TLS).build();
        assert_eq!(name_of(&d, &unknown), None);
        let nowhere = Element::builder("thing").namespace("urn:nowhere").build();
        assert_eq!(name_of(&d, &nowhere), None);
    }

    #[test]
    fn test_disabled_features_not_registered() {
        let d = Dispatcher::with_defaults(&SessionConfig {
            dialback_enabled: false,
            ..SessionConfig::default()
        });
        assert!(!d.handles_namespace(JABBER_SERVER_DIALBACK));
        assert!(!d.handles_namespace(JABBER_IQ_REGISTER));
    }
}
