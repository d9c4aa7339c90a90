//! Storage abstraction for handshake sessions.
//!
//! This module defines the `Store` trait and provides an in-memory
//! implementation for single-node deployments and tests. Every mutating
//! operation is an atomic compare-and-set keyed by the current status,
//! never read-then-write: the claimant's verify/complete sequence and
//! the sweeper can race on the same record, and exactly one sequence of
//! transitions must be observed system-wide.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::{Direction, HandshakeSession, TransitionError};
use crate::token;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No session with the given id exists.
    #[error("session not found")]
    NotFound,

    /// The presented secret token does not match the session.
    #[error("secret token mismatch")]
    SecretMismatch,

    /// The session is past its TTL.
    #[error("session expired")]
    Expired,

    /// The session already reached a terminal state.
    #[error("session already terminal")]
    AlreadyTerminal,

    /// The session is not in the state the transition requires.
    #[error("session in wrong state for transition")]
    WrongState,

    /// The caller's outstanding-session quota is exhausted.
    #[error("outstanding session quota exceeded")]
    CapacityExceeded,

    /// Infrastructure failure; safe to retry with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<TransitionError> for StoreError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::SecretMismatch => StoreError::SecretMismatch,
            TransitionError::Expired => StoreError::Expired,
            TransitionError::AlreadyTerminal => StoreError::AlreadyTerminal,
            TransitionError::WrongState => StoreError::WrongState,
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Storage abstraction for handshake session persistence.
///
/// Correctness property: for any session, across all concurrent
/// callers, concurrent duplicate `transition_completed` calls yield
/// exactly one success.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create a fresh `pending` session bound to `owner_user_id`.
    ///
    /// Generates a cryptographically random session id and secret
    /// token, both unique across live sessions. Fails with
    /// `CapacityExceeded` when the owner already holds the configured
    /// number of outstanding sessions.
    async fn create(
        &self,
        owner_user_id: &str,
        direction: Direction,
    ) -> Result<HandshakeSession, StoreError>;

    /// Read-only lookup by session id. No secret token required: this
    /// backs the issuer-side poller, which only observes status.
    async fn get(&self, session_id: &str) -> Result<Option<HandshakeSession>, StoreError>;

    /// Atomic `pending → verified` transition. Re-checks the TTL at the
    /// moment of transition, not only at creation.
    async fn transition_verified(
        &self,
        session_id: &str,
        secret_token: &str,
    ) -> Result<(), StoreError>;

    /// Atomic `verified → completed` transition, the one consuming
    /// step. Returns the session record so the caller can mint a
    /// credential for `owner_user_id`. Under concurrent duplicate
    /// calls, exactly one succeeds; the other observes `WrongState`.
    async fn transition_completed(
        &self,
        session_id: &str,
        secret_token: &str,
    ) -> Result<HandshakeSession, StoreError>;

    /// Transition every stale non-terminal session to `expired`.
    /// Returns the number of sessions swept.
    async fn sweep_expired(&self) -> Result<usize, StoreError>;

    /// Delete sessions that reached a terminal state longer than the
    /// retention window ago. Returns the number of sessions removed.
    async fn purge_terminal(&self) -> Result<usize, StoreError>;
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// Tuning knobs for the in-memory store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a session stays usable after creation.
    pub session_ttl: Duration,
    /// Maximum outstanding (non-terminal, unexpired) sessions per user.
    pub per_user_quota: usize,
    /// How long terminal sessions are kept before `purge_terminal`
    /// deletes them.
    pub terminal_retention: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::seconds(300),
            per_user_quota: 3,
            terminal_retention: Duration::seconds(600),
        }
    }
}

/// In-memory session store.
///
/// A single `RwLock` over the session map makes every transition a
/// guarded compare-and-set: the status check and the mutation happen
/// under one write lock, so duplicate completes cannot both pass the
/// check.
pub struct MemoryStore {
    config: StoreConfig,
    sessions: RwLock<HashMap<String, HandshakeSession>>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live records, terminal ones included. Feeds the
    /// active-session gauge.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create(
        &self,
        owner_user_id: &str,
        direction: Direction,
    ) -> Result<HandshakeSession, StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let outstanding = sessions
            .values()
            .filter(|s| s.owner_user_id == owner_user_id && s.is_outstanding(now))
            .count();
        if outstanding >= self.config.per_user_quota {
            return Err(StoreError::CapacityExceeded);
        }

        // Collisions are astronomically unlikely, but id and secret
        // uniqueness across live sessions is an invariant, so check.
        let session_id = loop {
            let id = token::new_session_id()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            if !sessions.contains_key(&id) {
                break id;
            }
        };
        let secret_token = loop {
            let secret = token::new_secret_token()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            if !sessions.values().any(|s| s.secret_token == secret) {
                break secret;
            }
        };

        let session = HandshakeSession::new(
            session_id.clone(),
            secret_token,
            direction,
            owner_user_id.to_string(),
            self.config.session_ttl,
            now,
        );
        sessions.insert(session_id.clone(), session.clone());
        debug!(session_id = %session_id, direction = %direction, "handshake session created");
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> Result<Option<HandshakeSession>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn transition_verified(
        &self,
        session_id: &str,
        secret_token: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or(StoreError::NotFound)?;
        session.apply_verify(secret_token, now)?;
        debug!(session_id = %session_id, "handshake session verified");
        Ok(())
    }

    async fn transition_completed(
        &self,
        session_id: &str,
        secret_token: &str,
    ) -> Result<HandshakeSession, StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or(StoreError::NotFound)?;
        session.apply_complete(secret_token, now)?;
        debug!(session_id = %session_id, "handshake session completed");
        Ok(session.clone())
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let mut swept = 0;
        for session in sessions.values_mut() {
            if session.is_past_ttl(now) && session.mark_expired() {
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn purge_terminal(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let retention = self.config.terminal_retention;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| match s.terminal_age(now) {
            Some(age) => age <= retention,
            None => true,
        });
        Ok(before - sessions.len())
    }
}
