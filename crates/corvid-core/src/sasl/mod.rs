//! SASL mechanisms and retry accounting.
//!
//! The handshake protocol (`auth`, `challenge`, `response`, `success`,
//! `failure`, `abort`) is driven by [`crate::handlers::sasl::SaslHandler`];
//! this module holds the pieces it delegates to.

mod plain;

pub use plain::Plain;

use crate::accounts::UserAuthentication;
use crate::condition::SaslCondition;
use crate::jid::Entity;

/// Failed attempts allowed before the stream is closed
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Counts failed authentication attempts on one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    attempts: u32,
    max: u32,
}

impl RetryCounter {
    /// Create a counter allowing `max` failures
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    /// Record one failure, returning the new count
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Whether no further attempts are allowed
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max
    }

    /// Clear after a successful authentication
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Failures so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured limit
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Attempts left before exhaustion
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.attempts)
    }
}

/// Result of one mechanism step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MechanismStep {
    /// Authenticated as the given bare entity
    Success(Entity),
    /// Send a challenge carrying these bytes and wait for a response
    Challenge(Vec<u8>),
    /// Authentication failed
    Failure(SaslCondition),
}

/// A SASL mechanism.
///
/// Mechanisms see decoded payload bytes; base64 handling and the element
/// exchange belong to the handshake handler.
pub trait SaslMechanism: Send + Sync {
    /// Mechanism name as advertised (`PLAIN`)
    fn name(&self) -> &'static str;

    /// Handle `<auth/>`. `initial` is `None` when the client sent no
    /// initial response and `Some(&[])` for an explicitly empty one (`=`).
    fn start(&self, initial: Option<&[u8]>, users: &dyn UserAuthentication, domain: &str) -> MechanismStep;

    /// Handle `<response/>` after a challenge
    fn respond(&self, response: &[u8], users: &dyn UserAuthentication, domain: &str) -> MechanismStep;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_counter() {
        let mut c = RetryCounter::new(3);
        assert!(!c.is_exhausted());
        assert_eq!(c.record_failure(), 1);
        assert_eq!(c.record_failure(), 2);
        assert_eq!(c.remaining(), 1);
        assert!(!c.is_exhausted());
        c.record_failure();
        assert!(c.is_exhausted());
        assert_eq!(c.remaining(), 0);
        c.reset();
        assert_eq!(c.attempts(), 0);
        assert!(!c.is_exhausted());
    }

    #[test]
    fn test_zero_max_is_always_exhausted() {
        assert!(RetryCounter::new(0).is_exhausted());
    }
}
