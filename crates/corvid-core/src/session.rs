//! Per-connection session state.
//!
//! A Session is mutated by exactly one task: the driver that owns the
//! connection. Handlers receive it by `&mut` for the duration of one stanza.

use crate::error::SessionError;
use crate::jid::Entity;
use crate::sasl::RetryCounter;
use crate::state::{SessionState, StreamDirection, StreamMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Session identifier, unique within one server process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw identifier
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Session policy parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether the transport can perform STARTTLS
    pub tls_available: bool,
    /// Refuse SASL until the stream is encrypted
    pub tls_required: bool,
    /// Failed SASL attempts before the stream is closed
    pub max_auth_retries: u32,
    /// Largest incomplete particle accepted from a peer, in bytes
    pub max_pending_bytes: usize,
    /// Offer and accept server dialback
    pub dialback_enabled: bool,
    /// Offer and accept in-band registration
    pub registration_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tls_available: false,
            tls_required: false,
            max_auth_retries: crate::sasl::DEFAULT_MAX_RETRIES,
            max_pending_bytes: corvid_xml::DEFAULT_MAX_PENDING,
            dialback_enabled: true,
            registration_enabled: false,
        }
    }
}

/// Counters kept for each session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Stanzas decoded from the peer
    pub stanzas_received: u64,
    /// Stanzas written to the peer
    pub stanzas_sent: u64,
    /// Stanzas rejected by state gating or sender checks
    pub stanzas_rejected: u64,
}

/// One connection's protocol state
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    mode: StreamMode,
    direction: StreamDirection,
    stream_id: Option<String>,
    xml_lang: Option<String>,
    /// Authenticated bare entity (c2s)
    authenticated: Option<Entity>,
    /// Bound full entity (c2s)
    bound: Option<Entity>,
    /// Peer domains verified by dialback (s2s)
    verified_domains: HashSet<String>,
    retries: RetryCounter,
    /// Mechanism waiting for a `<response/>`
    pending_mechanism: Option<&'static str>,
    stats: SessionStats,
}

impl Session {
    /// Create a session in [`SessionState::Initiated`]
    #[must_use]
    pub fn new(id: SessionId, config: &SessionConfig) -> Self {
        Self {
            id,
            state: SessionState::Initiated,
            mode: StreamMode::Client,
            direction: StreamDirection::Inbound,
            stream_id: None,
            xml_lang: None,
            authenticated: None,
            bound: None,
            verified_domains: HashSet::new(),
            retries: RetryCounter::new(config.max_auth_retries),
            pending_mechanism: None,
            stats: SessionStats::default(),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `new`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] if the move is not allowed.
    pub fn transition_to(&mut self, new: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition(new) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: new,
            });
        }
        let old = self.state;
        self.state = new;
        tracing::debug!(session = %self.id, "Session state transition: {:?} -> {:?}", old, new);
        Ok(())
    }

    /// Handle the transport's "encryption established" signal.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongState`] unless the session is in
    /// [`SessionState::EncryptionStarted`].
    pub fn encryption_established(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::EncryptionStarted {
            return Err(SessionError::WrongState {
                expected: SessionState::EncryptionStarted,
                actual: self.state,
            });
        }
        self.transition_to(SessionState::Encrypted)
    }

    /// Move to `Ended` if still live; idempotent afterwards
    pub fn end(&mut self) {
        if self.state.is_live() {
            self.state = SessionState::Ended;
            tracing::debug!(session = %self.id, "Session ended");
        }
    }

    /// Release the session; moves through `Ended` if needed
    pub fn close(&mut self) {
        self.end();
        self.state = SessionState::Closed;
    }

    /// Whether the stream is client-to-server or server-to-server
    #[must_use]
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Set the stream mode from the stream header
    pub fn set_mode(&mut self, mode: StreamMode) {
        self.mode = mode;
    }

    /// Whether the peer or this server opened the connection
    #[must_use]
    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    /// Mark the session as one this server initiated
    pub fn set_direction(&mut self, direction: StreamDirection) {
        self.direction = direction;
    }

    /// Stream id sent in the last stream header
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// Record the stream id of a new stream header
    pub fn set_stream_id(&mut self, id: String) {
        self.stream_id = Some(id);
    }

    /// Language from the peer's stream header
    #[must_use]
    pub fn xml_lang(&self) -> Option<&str> {
        self.xml_lang.as_deref()
    }

    /// Record the peer's `xml:lang`
    pub fn set_xml_lang(&mut self, lang: Option<String>) {
        self.xml_lang = lang;
    }

    /// Mark the session authenticated as `entity` (bare) and advance state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] if the state does not
    /// permit authentication.
    pub fn authenticate(&mut self, entity: Entity) -> Result<(), SessionError> {
        self.transition_to(SessionState::Authenticated)?;
        tracing::info!(session = %self.id, %entity, "Session authenticated");
        self.authenticated = Some(entity.bare());
        self.retries.reset();
        self.pending_mechanism = None;
        Ok(())
    }

    /// Authenticated bare entity
    #[must_use]
    pub fn authenticated_entity(&self) -> Option<&Entity> {
        self.authenticated.as_ref()
    }

    /// Bind a full entity to this session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] before authentication.
    pub fn bind(&mut self, entity: Entity) -> Result<(), SessionError> {
        if self.state != SessionState::Authenticated {
            return Err(SessionError::NotAuthenticated);
        }
        self.bound = Some(entity);
        Ok(())
    }

    /// Bound full entity
    #[must_use]
    pub fn bound_entity(&self) -> Option<&Entity> {
        self.bound.as_ref()
    }

    /// Record a peer domain verified by dialback
    pub fn add_verified_domain(&mut self, domain: &str) {
        self.verified_domains.insert(domain.to_ascii_lowercase());
    }

    /// Whether `domain` has been verified on this stream
    #[must_use]
    pub fn is_verified_domain(&self, domain: &str) -> bool {
        self.verified_domains.contains(&domain.to_ascii_lowercase())
    }

    /// SASL retry counter
    #[must_use]
    pub fn retries(&self) -> &RetryCounter {
        &self.retries
    }

    /// SASL retry counter, mutable
    pub fn retries_mut(&mut self) -> &mut RetryCounter {
        &mut self.retries
    }

    /// SASL mechanism that sent a challenge and awaits a response
    #[must_use]
    pub fn pending_mechanism(&self) -> Option<&'static str> {
        self.pending_mechanism
    }

    /// Record or clear the mechanism awaiting a response
    pub fn set_pending_mechanism(&mut self, mechanism: Option<&'static str>) {
        self.pending_mechanism = mechanism;
    }

    /// Session counters
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Session counters, mutable
    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionId::new(1), &SessionConfig::default())
    }

    #[test]
    fn test_new_session() {
        let s = session();
        assert_eq!(s.state(), SessionState::Initiated);
        assert_eq!(s.mode(), StreamMode::Client);
        assert!(s.bound_entity().is_none());
        assert_eq!(s.retries().max(), 3);
    }

    #[test]
    fn test_invalid_transition() {
        let mut s = session();
        assert_eq!(
            s.transition_to(SessionState::Authenticated),
            Err(SessionError::InvalidTransition {
                from: SessionState::Initiated,
                to: SessionState::Authenticated
            })
        );
        assert_eq!(s.state(), SessionState::Initiated);
    }

    #[test]
    fn test_encryption_established() {
        let mut s = session();
        assert!(s.encryption_established().is_err());
        s.transition_to(SessionState::Started).unwrap();
        s.transition_to(SessionState::EncryptionStarted).unwrap();
        s.encryption_established().unwrap();
        assert_eq!(s.state(), SessionState::Encrypted);
    }

    #[test]
    fn test_authenticate_and_bind() {
        let mut s = session();
        let juliet: Entity = "juliet@capulet.lit".parse().unwrap();
        assert_eq!(
            s.bind(juliet.with_resource("balcony").unwrap()),
            Err(SessionError::NotAuthenticated)
        );

        s.transition_to(SessionState::Started).unwrap();
        s.authenticate(juliet.clone()).unwrap();
        assert_eq!(s.authenticated_entity(), Some(&juliet));

        s.bind(juliet.with_resource("balcony").unwrap()).unwrap();
        assert_eq!(
            s.bound_entity().map(ToString::to_string).as_deref(),
            Some("juliet@capulet.lit/balcony")
        );
    }

    #[test]
    fn test_end_and_close() {
        let mut s = session();
        s.end();
        assert_eq!(s.state(), SessionState::Ended);
        s.end();
        assert_eq!(s.state(), SessionState::Ended);
        s.close();
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn test_verified_domains_case_insensitive() {
        let mut s = session();
        s.add_verified_domain("Montague.LIT");
        assert!(s.is_verified_domain("montague.lit"));
        assert!(!s.is_verified_domain("capulet.lit"));
    }
}
