//! Random identifier and secret generation.
//!
//! Session ids and secret tokens come straight from the OS RNG and are
//! never derived from user-controlled input. The id is shorter because
//! it is not a secret; the secret token carries 256 bits of entropy.

use thiserror::Error;

const SESSION_ID_BYTES: usize = 16;
const SECRET_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
#[error("system rng failed: {0}")]
pub struct TokenError(String);

fn random_hex(len: usize) -> Result<String, TokenError> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|e| TokenError(e.to_string()))?;
    Ok(hex::encode(buf))
}

/// Opaque, non-secret session identifier (32 hex chars).
pub fn new_session_id() -> Result<String, TokenError> {
    random_hex(SESSION_ID_BYTES)
}

/// High-entropy claimant authorization token (64 hex chars).
pub fn new_secret_token() -> Result<String, TokenError> {
    random_hex(SECRET_TOKEN_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_and_charset() {
        let id = new_session_id().unwrap();
        let secret = new_secret_token().unwrap();
        assert_eq!(id.len(), SESSION_ID_BYTES * 2);
        assert_eq!(secret.len(), SECRET_TOKEN_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn successive_values_differ() {
        assert_ne!(new_session_id().unwrap(), new_session_id().unwrap());
        assert_ne!(new_secret_token().unwrap(), new_secret_token().unwrap());
    }
}
