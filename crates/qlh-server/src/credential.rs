//! Access credential minting.
//!
//! Completing a handshake exchanges the verified session for a fresh
//! HS256 JWT bound to the session's owner. The credential is minted
//! only after `transition_completed` succeeds, so a crash between the
//! two can at worst leave a completed session whose credential delivery
//! failed. Recovery is a fresh session, never re-completing the old one.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential encoding failed: {0}")]
    Encoding(String),
    #[error("credential invalid: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The user the handoff granted a session for.
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    /// Handoff session id the credential was minted from, for audit.
    pub hnd: String,
}

/// A freshly minted credential, ready for the HTTP response.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

pub struct CredentialIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl CredentialIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Mint an access token for `owner_user_id`.
    pub fn issue(
        &self,
        owner_user_id: &str,
        session_id: &str,
    ) -> Result<IssuedCredential, CredentialError> {
        let iat = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: owner_user_id.to_string(),
            iat,
            exp: iat + self.ttl_secs,
            hnd: session_id.to_string(),
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CredentialError::Encoding(e.to_string()))?;

        Ok(IssuedCredential {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_secs,
        })
    }

    /// Decode and validate a previously issued token.
    pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| CredentialError::Invalid(e.to_string()))?;
        Ok(data.claims)
    }
}
