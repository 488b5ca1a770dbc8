//! # Corvid Crypto
//!
//! Cryptographic primitives for the Corvid messaging server.
//!
//! This crate provides:
//! - Server dialback key generation and token verification
//! - Constant-time comparison
//! - Secure random stream and resource identifiers
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Dialback key | SHA-256 of a per-process random secret |
//! | Dialback token | HMAC-SHA-256, hex encoded |
//! | Comparison | constant time (`subtle`) |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod constant_time;
pub mod dialback;
pub mod error;
pub mod random;

pub use dialback::{DIALBACK_TOKEN_LEN, DialbackKey, DialbackToken};
pub use error::CryptoError;
