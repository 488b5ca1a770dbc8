//! Server-wide state shared by every session.

use crate::accounts::{AccountManagement, InMemoryAccounts, UserAuthentication};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::jid::Entity;
use crate::relay::{NoConnector, NullRelay, ServerConnector, StanzaRelay};
use crate::sasl::{Plain, SaslMechanism};
use crate::session::{Session, SessionConfig, SessionId};
use corvid_crypto::DialbackKey;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Immutable server state plus the session id counter.
///
/// Built once at startup and shared behind an `Arc`.
pub struct ServerContext {
    domain: Entity,
    config: SessionConfig,
    dialback_key: DialbackKey,
    dispatcher: Dispatcher,
    mechanisms: Vec<Box<dyn SaslMechanism>>,
    users: Arc<dyn UserAuthentication>,
    accounts: Option<Arc<dyn AccountManagement>>,
    relay: Arc<dyn StanzaRelay>,
    connector: Arc<dyn ServerConnector>,
    next_session: AtomicU64,
}

impl ServerContext {
    /// Start building a context serving `domain`
    #[must_use]
    pub fn builder(domain: Entity) -> ServerContextBuilder {
        ServerContextBuilder::new(domain)
    }

    /// Served domain
    #[must_use]
    pub fn domain(&self) -> &Entity {
        &self.domain
    }

    /// Session policy
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Secret used for dialback keys
    #[must_use]
    pub fn dialback_key(&self) -> &DialbackKey {
        &self.dialback_key
    }

    /// Handler lookup
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// SASL mechanism by name (case-sensitive, as advertised)
    #[must_use]
    pub fn mechanism(&self, name: &str) -> Option<&dyn SaslMechanism> {
        self.mechanisms
            .iter()
            .map(AsRef::as_ref)
            .find(|m| m.name() == name)
    }

    /// Names of the offered SASL mechanisms
    pub fn mechanism_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.mechanisms.iter().map(|m| m.name())
    }

    /// Credential check used by SASL
    #[must_use]
    pub fn users(&self) -> &dyn UserAuthentication {
        self.users.as_ref()
    }

    /// Account creation backend, if registration is possible
    #[must_use]
    pub fn accounts(&self) -> Option<&dyn AccountManagement> {
        self.accounts.as_deref()
    }

    /// Stanza delivery
    #[must_use]
    pub fn relay(&self) -> &dyn StanzaRelay {
        self.relay.as_ref()
    }

    /// Outbound dialback verification
    #[must_use]
    pub fn connector(&self) -> &dyn ServerConnector {
        self.connector.as_ref()
    }

    /// Allocate a session id
    pub fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a fresh session in `Initiated`
    pub fn new_session(&self) -> Session {
        Session::new(self.next_session_id(), &self.config)
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("domain", &self.domain)
            .field("config", &self.config)
            .field("mechanisms", &self.mechanism_names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServerContext`]
pub struct ServerContextBuilder {
    domain: Entity,
    config: SessionConfig,
    dialback_key: Option<DialbackKey>,
    dispatcher: Option<Dispatcher>,
    mechanisms: Vec<Box<dyn SaslMechanism>>,
    users: Option<Arc<dyn UserAuthentication>>,
    accounts: Option<Arc<dyn AccountManagement>>,
    relay: Arc<dyn StanzaRelay>,
    connector: Arc<dyn ServerConnector>,
}

impl ServerContextBuilder {
    fn new(domain: Entity) -> Self {
        Self {
            domain: domain.domain_entity(),
            config: SessionConfig::default(),
            dialback_key: None,
            dispatcher: None,
            mechanisms: vec![Box::new(Plain)],
            users: None,
            accounts: None,
            relay: Arc::new(NullRelay),
            connector: Arc::new(NoConnector),
        }
    }

    /// Session policy
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a fixed dialback secret instead of a random one
    #[must_use]
    pub fn dialback_key(mut self, key: DialbackKey) -> Self {
        self.dialback_key = Some(key);
        self
    }

    /// Replace the default dispatcher
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Offer an additional SASL mechanism
    #[must_use]
    pub fn mechanism(mut self, mechanism: Box<dyn SaslMechanism>) -> Self {
        self.mechanisms.push(mechanism);
        self
    }

    /// Credential backend
    #[must_use]
    pub fn users(mut self, users: Arc<dyn UserAuthentication>) -> Self {
        self.users = Some(users);
        self
    }

    /// Registration backend
    #[must_use]
    pub fn accounts(mut self, accounts: Arc<dyn AccountManagement>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Stanza delivery
    #[must_use]
    pub fn relay(mut self, relay: Arc<dyn StanzaRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// Outbound dialback verification
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn ServerConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Finish building.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if no dialback key was given and the random
    /// source fails.
    pub fn build(self) -> Result<ServerContext> {
        let dialback_key = match self.dialback_key {
            Some(key) => key,
            None => DialbackKey::generate()?,
        };
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Dispatcher::with_defaults(&self.config));
        let users = self
            .users
            .unwrap_or_else(|| Arc::new(InMemoryAccounts::new()));

        tracing::debug!(domain = %self.domain, "Server context ready");

        Ok(ServerContext {
            domain: self.domain,
            config: self.config,
            dialback_key,
            dispatcher,
            mechanisms: self.mechanisms,
            users,
            accounts: self.accounts,
            relay: self.relay,
            connector: self.connector,
            next_session: AtomicU64::new(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let ctx = ServerContext::builder("capulet.lit".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(ctx.domain().to_string(), "capulet.lit");
        assert_eq!(ctx.mechanism_names().collect::<Vec<_>>(), vec!["PLAIN"]);
        assert!(ctx.mechanism("PLAIN").is_some());
        assert!(ctx.mechanism("plain").is_none());
        assert!(ctx.accounts().is_none());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let ctx = ServerContext::builder("capulet.lit".parse().unwrap())
            .build()
            .unwrap();
        let a = ctx.new_session();
        let b = ctx.new_session();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_domain_strips_node_and_resource() {
        let ctx = ServerContext::builder("admin@capulet.lit/x".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(ctx.domain().to_string(), "capulet.lit");
    }
}
