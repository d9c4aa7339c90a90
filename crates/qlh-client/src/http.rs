//! HTTP transport for talking to the handoff service.
//!
//! Thin typed wrapper over reqwest. The server already collapses
//! sensitive errors, so the mapping here is mechanical: each status
//! code the API documents gets its own variant, everything else lands
//! in `Server`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use qlh_core::{Direction, SessionStatus};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid or expired code")]
    InvalidOrExpired,

    #[error("code already used")]
    AlreadyUsed,

    #[error("too many outstanding codes")]
    CapacityExceeded,

    #[error("server error (status {0})")]
    Server(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// A freshly generated handoff session, as returned by the server.
/// The secret token travels only inside `qr_payload`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedHandoff {
    pub session_id: String,
    pub qr_payload: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessCredential {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: SessionStatus,
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a handoff session. Requires the caller's issuer bearer
    /// token, the one part of the API that needs prior authentication.
    pub async fn generate(
        &self,
        issuer_token: &str,
        direction: Direction,
    ) -> Result<GeneratedHandoff, ClientError> {
        let response = self
            .client
            .post(format!("{}/v1/handoff", self.base_url))
            .bearer_auth(issuer_token)
            .json(&serde_json::json!({ "direction": direction }))
            .send()
            .await?;

        let response = Self::check_status(response)?;
        Ok(response.json().await?)
    }

    pub async fn status(&self, session_id: &str) -> Result<SessionStatus, ClientError> {
        let response = self
            .client
            .get(format!("{}/v1/handoff/{}", self.base_url, session_id))
            .send()
            .await?;

        let response = Self::check_status(response)?;
        let body: StatusBody = response.json().await?;
        Ok(body.status)
    }

    pub async fn verify(&self, session_id: &str, secret_token: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(format!("{}/v1/handoff/verify", self.base_url))
            .json(&serde_json::json!({
                "session_id": session_id,
                "secret_token": secret_token,
            }))
            .send()
            .await?;

        Self::check_status(response)?;
        Ok(())
    }

    /// The consuming call: on success the session is spent and the
    /// returned credential is the only copy.
    pub async fn complete(
        &self,
        session_id: &str,
        secret_token: &str,
    ) -> Result<AccessCredential, ClientError> {
        let response = self
            .client
            .post(format!("{}/v1/handoff/complete", self.base_url))
            .json(&serde_json::json!({
                "session_id": session_id,
                "secret_token": secret_token,
            }))
            .send()
            .await?;

        let response = Self::check_status(response)?;
        Ok(response.json().await?)
    }

    fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status.as_u16() {
            401 => ClientError::Unauthenticated,
            404 => ClientError::InvalidOrExpired,
            409 => ClientError::AlreadyUsed,
            429 => ClientError::CapacityExceeded,
            code => ClientError::Server(code),
        })
    }
}
