//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Generate a random 32-byte array.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_32() -> Result<[u8; 32], CryptoError> {
    let mut buf = [0u8; 32];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a fresh stream identifier: 8 random bytes, hex encoded.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn stream_id() -> Result<String, CryptoError> {
    let mut buf = [0u8; 8];
    fill_random(&mut buf)?;
    Ok(hex::encode(buf))
}

/// Generate a random resource identifier for clients that bind without one.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn resource_id() -> Result<String, CryptoError> {
    let mut buf = [0u8; 6];
    fill_random(&mut buf)?;
    Ok(format!("corvid-{}", hex::encode(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_32_differs() {
        let a = random_32().unwrap();
        let b = random_32().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_stream_id_format() {
        let id = stream_id().unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, stream_id().unwrap());
    }

    #[test]
    fn test_resource_id_prefix() {
        assert!(resource_id().unwrap().starts_with("corvid-"));
    }
}
