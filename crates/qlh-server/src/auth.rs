//! Bearer-token authentication for the generate path.
//!
//! The primary authentication system is outside this service; what it
//! hands us is a static bearer-token → user-id map, which is enough to
//! answer "caller is authenticated as user U" for session creation.
//! Claimant-side calls carry no bearer token: there the secret token
//! inside the scanned payload is the authorization bearer.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: HashMap<String, String>,
}

impl AuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(&mut self, token: String, user_id: String) {
        self.tokens.insert(token, user_id);
    }

    /// Resolve the caller's user id, or fail.
    pub fn authenticate(&self, token: Option<&str>) -> Result<String, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
}

pub fn extract_bearer_token(header: Option<&axum::http::HeaderValue>) -> Option<&str> {
    let header = header?;
    let header_str = header.to_str().ok()?;
    header_str.strip_prefix("Bearer ")
}
