//! QR payload codec.
//!
//! The scannable content of the QR image is a compact JSON object
//! carrying exactly what the claimant needs:
//!
//! ```json
//! {"type": "primary_to_secondary", "session_id": "...", "secret_token": "..."}
//! ```
//!
//! `type` is the direction marker, so a payload minted for one flow is
//! never silently accepted by the other. Decoding is all-or-nothing: a
//! missing field, an empty field, or an unrecognized `type` is rejected
//! as malformed, with no partial processing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Direction, HandshakeSession};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// The decoded QR payload triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    /// Direction marker; serialized as the `type` field on the wire.
    #[serde(rename = "type")]
    pub direction: Direction,
    pub session_id: String,
    pub secret_token: String,
}

impl QrPayload {
    /// Payload for a freshly created session.
    pub fn for_session(session: &HandshakeSession) -> Self {
        Self {
            direction: session.direction,
            session_id: session.session_id.clone(),
            secret_token: session.secret_token.clone(),
        }
    }

    /// Serialize to the scannable JSON string.
    pub fn encode(&self) -> Result<String, PayloadError> {
        serde_json::to_string(self).map_err(|e| PayloadError::Malformed(e.to_string()))
    }

    /// Parse and validate scanned content.
    pub fn decode(raw: &str) -> Result<Self, PayloadError> {
        let payload: QrPayload =
            serde_json::from_str(raw).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        if payload.session_id.is_empty() {
            return Err(PayloadError::Malformed("empty session_id".to_string()));
        }
        if payload.secret_token.is_empty() {
            return Err(PayloadError::Malformed("empty secret_token".to_string()));
        }
        Ok(payload)
    }
}
