//! Claimant-side flow: scan, verify, complete.
//!
//! The claiming device runs this after its camera hands over the raw
//! QR string. The flow is strictly linear and never retries on its
//! own: a rejected step means the user re-scans or the granting device
//! generates a fresh code. Retrying a consumed code can only fail.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use qlh_core::{Direction, PayloadError, QrPayload};

use crate::http::{AccessCredential, ApiClient, ClientError};

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("unreadable code: {0}")]
    Payload(#[from] PayloadError),

    /// The code is for the opposite transfer direction, e.g. a
    /// "log the phone in" code scanned by the desktop flow.
    #[error("code is for direction '{found}', expected '{expected}'")]
    DirectionMismatch {
        expected: Direction,
        found: Direction,
    },

    #[error(transparent)]
    Rejected(#[from] ClientError),
}

/// The two server calls the claimant makes, behind a trait so the flow
/// is testable without a server.
#[async_trait]
pub trait ClaimTransport: Send + Sync {
    async fn verify(&self, session_id: &str, secret_token: &str) -> Result<(), ClientError>;
    async fn complete(
        &self,
        session_id: &str,
        secret_token: &str,
    ) -> Result<AccessCredential, ClientError>;
}

#[async_trait]
impl ClaimTransport for ApiClient {
    async fn verify(&self, session_id: &str, secret_token: &str) -> Result<(), ClientError> {
        ApiClient::verify(self, session_id, secret_token).await
    }

    async fn complete(
        &self,
        session_id: &str,
        secret_token: &str,
    ) -> Result<AccessCredential, ClientError> {
        ApiClient::complete(self, session_id, secret_token).await
    }
}

pub struct Claimant<T> {
    transport: T,
    expected_direction: Direction,
}

impl<T: ClaimTransport> Claimant<T> {
    pub fn new(transport: T, expected_direction: Direction) -> Self {
        Self {
            transport,
            expected_direction,
        }
    }

    /// Run the full claim against a scanned QR string.
    ///
    /// Direction is checked before anything goes on the wire, so a
    /// code scanned by the wrong flow is rejected without spending it.
    pub async fn claim(&self, scanned: &str) -> Result<AccessCredential, ClaimError> {
        let payload = QrPayload::decode(scanned)?;

        if payload.direction != self.expected_direction {
            return Err(ClaimError::DirectionMismatch {
                expected: self.expected_direction,
                found: payload.direction,
            });
        }

        self.transport
            .verify(&payload.session_id, &payload.secret_token)
            .await?;
        info!(session_id = %payload.session_id, "handoff verified, completing");

        let credential = self
            .transport
            .complete(&payload.session_id, &payload.secret_token)
            .await?;
        info!(session_id = %payload.session_id, "handoff completed, credential received");

        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeTransport {
        verify_result: fn() -> Result<(), ClientError>,
        complete_result: fn() -> Result<AccessCredential, ClientError>,
        verify_calls: AtomicU32,
        complete_calls: AtomicU32,
    }

    impl FakeTransport {
        fn new(
            verify_result: fn() -> Result<(), ClientError>,
            complete_result: fn() -> Result<AccessCredential, ClientError>,
        ) -> Self {
            Self {
                verify_result,
                complete_result,
                verify_calls: AtomicU32::new(0),
                complete_calls: AtomicU32::new(0),
            }
        }
    }

    fn credential() -> Result<AccessCredential, ClientError> {
        Ok(AccessCredential {
            access_token: "jwt".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 900,
        })
    }

    #[async_trait]
    impl ClaimTransport for &FakeTransport {
        async fn verify(&self, _: &str, _: &str) -> Result<(), ClientError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            (self.verify_result)()
        }

        async fn complete(&self, _: &str, _: &str) -> Result<AccessCredential, ClientError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            (self.complete_result)()
        }
    }

    fn scanned(direction: &str) -> String {
        serde_json::json!({
            "type": direction,
            "session_id": "sid-1",
            "secret_token": "tok-1",
        })
        .to_string()
    }

    #[tokio::test]
    async fn successful_claim_verifies_then_completes() {
        let transport = FakeTransport::new(|| Ok(()), credential);
        let claimant = Claimant::new(&transport, Direction::PrimaryToSecondary);

        let cred = claimant
            .claim(&scanned("primary_to_secondary"))
            .await
            .unwrap();
        assert_eq!(cred.token_type, "Bearer");
        assert_eq!(transport.verify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn direction_mismatch_never_touches_the_wire() {
        let transport = FakeTransport::new(|| Ok(()), credential);
        let claimant = Claimant::new(&transport, Direction::PrimaryToSecondary);

        let err = claimant
            .claim(&scanned("secondary_to_primary"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::DirectionMismatch { .. }));
        assert_eq!(transport.verify_calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_verify_stops_before_complete() {
        let transport = FakeTransport::new(|| Err(ClientError::InvalidOrExpired), credential);
        let claimant = Claimant::new(&transport, Direction::PrimaryToSecondary);

        let err = claimant
            .claim(&scanned("primary_to_secondary"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClaimError::Rejected(ClientError::InvalidOrExpired)
        ));
        assert_eq!(transport.complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn garbage_scan_is_a_payload_error() {
        let transport = FakeTransport::new(|| Ok(()), credential);
        let claimant = Claimant::new(&transport, Direction::PrimaryToSecondary);

        let err = claimant.claim("not json at all").await.unwrap_err();
        assert!(matches!(err, ClaimError::Payload(_)));
    }
}
