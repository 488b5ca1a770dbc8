//! Server dialback keys.
//!
//! A dialback token binds a stream to the pair of domains using it:
//!
//! ```text
//! key   = hex(SHA-256(secret))
//! token = hex(HMAC-SHA-256(key, receiving ' ' originating ' ' stream_id))
//! ```
//!
//! The secret is generated once per process and never leaves it. Tokens are
//! not stored; the authoritative server recomputes them to answer a
//! verification request.

use crate::CryptoError;
use crate::constant_time::ct_eq_str;
use crate::random::random_32;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded dialback token
pub const DIALBACK_TOKEN_LEN: usize = 64;

/// Hex-encoded dialback token
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DialbackToken(String);

impl DialbackToken {
    /// Token text as sent on the wire
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the wire text
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DialbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DialbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DialbackToken({}…)", &self.0[..self.0.len().min(8)])
    }
}

/// Process-wide dialback key.
///
/// Built once at startup and shared read-only by every session.
#[derive(Clone)]
pub struct DialbackKey {
    mac: HmacSha256,
}

impl DialbackKey {
    /// Create a key from a fresh random secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let secret = Zeroizing::new(random_32()?);
        Self::from_secret(secret.as_slice())
    }

    /// Create a key from a caller-provided secret.
    ///
    /// Used by clustered deployments that need identical tokens on every
    /// node, and by tests.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if `secret` is empty.
    pub fn from_secret(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 0,
            });
        }
        let key = Zeroizing::new(hex::encode(Sha256::digest(secret)));
        let mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: 64,
                actual: key.len(),
            }
        })?;
        Ok(Self { mac })
    }

    /// Compute the token for a stream between two domains
    #[must_use]
    pub fn token(&self, receiving: &str, originating: &str, stream_id: &str) -> DialbackToken {
        let mut mac = self.mac.clone();
        mac.update(receiving.as_bytes());
        mac.update(b" ");
        mac.update(originating.as_bytes());
        mac.update(b" ");
        mac.update(stream_id.as_bytes());
        DialbackToken(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a token received from a peer in constant time
    #[must_use]
    pub fn verify(&self, token: &str, receiving: &str, originating: &str, stream_id: &str) -> bool {
        let expected = self.token(receiving, originating, stream_id);
        ct_eq_str(expected.as_str(), token)
    }
}

impl fmt::Debug for DialbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DialbackKey(..)")
    }
}
