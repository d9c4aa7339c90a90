//! HTTP API for the handoff service.
//!
//! Route map:
//!
//! | Route | Method | Caller |
//! |---|---|---|
//! | `/v1/handoff` | POST | granting device (bearer auth) |
//! | `/v1/handoff/:session_id` | GET | granting device (poller) |
//! | `/v1/handoff/verify` | POST | claiming device |
//! | `/v1/handoff/complete` | POST | claiming device |
//! | `/health` | GET | anyone |
//! | `/metrics` | GET | operators |
//!
//! The store reports precise errors; this layer collapses the
//! security-sensitive ones. A wrong secret, an unknown id, and a stale
//! session all come back as the same "invalid or expired code", so a
//! response never reveals which half of the pair was wrong. "Already
//! used" stays distinct: it is not security-sensitive and the claimant
//! UI needs it.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

use qlh_core::{Direction, QrPayload, SessionStatus, Store, StoreError};

use crate::auth::{extract_bearer_token, AuthConfig};
use crate::credential::{CredentialIssuer, IssuedCredential};
use crate::metrics::HandoffMetrics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: AuthConfig,
    pub credentials: Arc<CredentialIssuer>,
    pub metrics: Arc<HandoffMetrics>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/handoff", post(generate_handoff))
        .route("/v1/handoff/:session_id", get(get_status))
        .route("/v1/handoff/verify", post(verify_handoff))
        .route("/v1/handoff/complete", post(complete_handoff))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub direction: Direction,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub session_id: String,
    /// The exact string to render as a QR image.
    pub qr_payload: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub session_id: String,
    pub secret_token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub ok: bool,
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Client-facing errors, already collapsed.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,
    /// NotFound, SecretMismatch, and Expired fold into this one.
    #[error("invalid or expired code")]
    InvalidOrExpired,
    /// AlreadyTerminal and WrongState fold into this one.
    #[error("code already used")]
    AlreadyUsed,
    #[error("too many outstanding codes")]
    CapacityExceeded,
    #[error("temporarily unavailable")]
    Unavailable,
    #[error("internal error")]
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound | StoreError::SecretMismatch | StoreError::Expired => {
                ApiError::InvalidOrExpired
            }
            StoreError::AlreadyTerminal | StoreError::WrongState => ApiError::AlreadyUsed,
            StoreError::CapacityExceeded => ApiError::CapacityExceeded,
            StoreError::Unavailable(reason) => {
                warn!(reason = %reason, "store unavailable");
                ApiError::Unavailable
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidOrExpired => StatusCode::NOT_FOUND,
            ApiError::AlreadyUsed => StatusCode::CONFLICT,
            ApiError::CapacityExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

// POST /v1/handoff
pub async fn generate_handoff(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let start = Instant::now();

    let token = extract_bearer_token(headers.get("authorization"));
    let owner_user_id = state.auth.authenticate(token).map_err(|_| {
        state.metrics.auth_failures.inc();
        ApiError::Unauthenticated
    })?;

    let session = state
        .store
        .create(&owner_user_id, request.direction)
        .await
        .map_err(|e| {
            state.metrics.error_counts.inc();
            ApiError::from(e)
        })?;

    let qr_payload = QrPayload::for_session(&session).encode().map_err(|_| {
        state.metrics.error_counts.inc();
        ApiError::Internal
    })?;

    state.metrics.sessions_created.inc();
    state.metrics.request_latency.observe(start.elapsed().as_secs_f64());
    info!(session_id = %session.session_id, direction = %session.direction, "handoff session generated");

    Ok((
        StatusCode::OK,
        Json(GenerateResponse {
            session_id: session.session_id,
            qr_payload,
            expires_at: session.expires_at,
        }),
    ))
}

// GET /v1/handoff/{session_id}
//
// Read path for the issuer-side poller. No secret token: it only
// reveals status, never performs a mutation. An expired session still
// reports its status here so the poller can see it.
pub async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .store
        .get(&session_id)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::InvalidOrExpired)?;

    Ok((
        StatusCode::OK,
        Json(StatusResponse {
            status: session.status,
        }),
    ))
}

// POST /v1/handoff/verify
pub async fn verify_handoff(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let start = Instant::now();

    state
        .store
        .transition_verified(&request.session_id, &request.secret_token)
        .await
        .map_err(|e| {
            state.metrics.error_counts.inc();
            ApiError::from(e)
        })?;

    state.metrics.sessions_verified.inc();
    state.metrics.request_latency.observe(start.elapsed().as_secs_f64());
    info!(session_id = %request.session_id, "handoff session verified");

    Ok((StatusCode::OK, Json(VerifyResponse { ok: true })))
}

// POST /v1/handoff/complete
//
// The consuming step: exactly one caller per session ever receives a
// credential. The credential is minted only after the store transition
// succeeds.
pub async fn complete_handoff(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let start = Instant::now();

    let session = state
        .store
        .transition_completed(&request.session_id, &request.secret_token)
        .await
        .map_err(|e| {
            state.metrics.error_counts.inc();
            ApiError::from(e)
        })?;

    let credential: IssuedCredential = state
        .credentials
        .issue(&session.owner_user_id, &session.session_id)
        .map_err(|e| {
            state.metrics.error_counts.inc();
            warn!(session_id = %session.session_id, error = %e, "credential minting failed after completion");
            ApiError::Internal
        })?;

    state.metrics.sessions_completed.inc();
    state.metrics.request_latency.observe(start.elapsed().as_secs_f64());
    info!(session_id = %session.session_id, "handoff session completed, credential issued");

    Ok((StatusCode::OK, Json(credential)))
}

// GET /health
pub async fn get_health() -> Response {
    let response = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response)).into_response()
}

// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let prometheus = state.metrics.export_prometheus();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        prometheus,
    )
        .into_response()
}
