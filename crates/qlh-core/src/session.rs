//! Handshake session data model and state machine.
//!
//! A `HandshakeSession` is the server-side record behind one QR login
//! handoff: an already-authenticated device creates it, the scanning
//! device consumes it, and the sweeper expires it. All mutations go
//! through the guarded transition methods here so the monotonic
//! lifecycle (`pending → verified → completed`, or `→ expired`) can
//! never be violated by a caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which device is granting a session and which is receiving one.
///
/// The wire names double as the `type` marker inside the QR payload, so
/// a payload minted for one flow is rejected by the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Browser session projects a login onto a mobile device.
    PrimaryToSecondary,
    /// Mobile session projects a login onto a browser.
    SecondaryToPrimary,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::PrimaryToSecondary => "primary_to_secondary",
            Direction::SecondaryToPrimary => "secondary_to_primary",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary_to_secondary" => Ok(Direction::PrimaryToSecondary),
            "secondary_to_primary" => Ok(Direction::SecondaryToPrimary),
            other => Err(format!(
                "unknown direction '{other}'. Valid values: primary_to_secondary, secondary_to_primary"
            )),
        }
    }
}

/// Lifecycle status of a handshake session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Verified,
    Completed,
    Expired,
}

impl SessionStatus {
    /// `completed` and `expired` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Expired)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Verified => "verified",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Errors produced by the transition methods.
///
/// These are the precise internal errors; the HTTP layer collapses the
/// security-sensitive distinctions before anything reaches a client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The presented secret token does not match this session.
    #[error("secret token mismatch")]
    SecretMismatch,

    /// The session is past its TTL (or was already swept).
    #[error("session expired")]
    Expired,

    /// The session already reached a terminal state or was verified twice.
    #[error("session already terminal")]
    AlreadyTerminal,

    /// The session is not in the state the transition requires.
    #[error("session in wrong state for transition")]
    WrongState,
}

/// Server-side record for one QR login handoff.
///
/// `session_id` is opaque but non-secret (it is visible in the rendered
/// QR code and on the status read path). `secret_token` authorizes all
/// claimant-side mutations and must never be logged.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeSession {
    pub session_id: String,
    pub secret_token: String,
    pub direction: Direction,
    pub owner_user_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HandshakeSession {
    /// Build a fresh `pending` session owned by `owner_user_id`.
    pub fn new(
        session_id: String,
        secret_token: String,
        direction: Direction,
        owner_user_id: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            secret_token,
            direction,
            owner_user_id,
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            verified_at: None,
            completed_at: None,
        }
    }

    /// True once `now` is past `expires_at`, regardless of status.
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Counts toward the per-user outstanding quota: neither terminal
    /// nor silently past its TTL.
    pub fn is_outstanding(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && !self.is_past_ttl(now)
    }

    /// How long ago the session reached a terminal state, if it has.
    pub fn terminal_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.status {
            SessionStatus::Completed => self.completed_at.map(|t| now - t),
            // Swept sessions carry no terminal timestamp; measure from expiry.
            SessionStatus::Expired => Some(now - self.expires_at),
            _ => None,
        }
    }

    /// Force the session to `expired`. Used by the sweeper and by
    /// transitions that observe the TTL has passed. No-op on terminal
    /// sessions.
    pub fn mark_expired(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Expired;
        true
    }

    /// Guarded `pending → verified` transition.
    ///
    /// The TTL is re-checked here, at transition time: a stale session
    /// fails with `Expired` even if the sweeper has not touched it yet
    /// (and is marked expired as a side effect).
    pub fn apply_verify(
        &mut self,
        secret_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.secret_token != secret_token {
            return Err(TransitionError::SecretMismatch);
        }
        if self.status == SessionStatus::Expired {
            return Err(TransitionError::Expired);
        }
        if self.is_past_ttl(now) {
            self.mark_expired();
            return Err(TransitionError::Expired);
        }
        match self.status {
            SessionStatus::Pending => {
                self.status = SessionStatus::Verified;
                self.verified_at = Some(now);
                Ok(())
            }
            // Double-scan: the code was already consumed one way or another.
            SessionStatus::Verified | SessionStatus::Completed => {
                Err(TransitionError::AlreadyTerminal)
            }
            SessionStatus::Expired => Err(TransitionError::Expired),
        }
    }

    /// Guarded `verified → completed` transition, the one consuming and
    /// irreversible step. Callers race on this; exactly one wins.
    pub fn apply_complete(
        &mut self,
        secret_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.secret_token != secret_token {
            return Err(TransitionError::SecretMismatch);
        }
        if self.status == SessionStatus::Expired {
            return Err(TransitionError::Expired);
        }
        if self.is_past_ttl(now) {
            self.mark_expired();
            return Err(TransitionError::Expired);
        }
        match self.status {
            SessionStatus::Verified => {
                self.status = SessionStatus::Completed;
                self.completed_at = Some(now);
                Ok(())
            }
            // Completing from `pending` would skip verification; completing
            // twice would re-issue a credential. Both are refused.
            SessionStatus::Pending | SessionStatus::Completed => Err(TransitionError::WrongState),
            SessionStatus::Expired => Err(TransitionError::Expired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(ttl_secs: i64) -> HandshakeSession {
        HandshakeSession::new(
            "sid-1".to_string(),
            "sec-1".to_string(),
            Direction::PrimaryToSecondary,
            "user-a".to_string(),
            Duration::seconds(ttl_secs),
            Utc::now(),
        )
    }

    #[test]
    fn full_lifecycle_pending_verified_completed() {
        let mut s = session(300);
        let now = Utc::now();

        assert_eq!(s.status, SessionStatus::Pending);
        s.apply_verify("sec-1", now).unwrap();
        assert_eq!(s.status, SessionStatus::Verified);
        assert!(s.verified_at.is_some());

        s.apply_complete("sec-1", now).unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.completed_at.is_some());
        assert!(s.status.is_terminal());
    }

    #[test]
    fn complete_cannot_skip_verification() {
        let mut s = session(300);
        let err = s.apply_complete("sec-1", Utc::now()).unwrap_err();
        assert_eq!(err, TransitionError::WrongState);
        assert_eq!(s.status, SessionStatus::Pending);
    }

    #[test]
    fn second_complete_observes_wrong_state() {
        let mut s = session(300);
        let now = Utc::now();
        s.apply_verify("sec-1", now).unwrap();
        s.apply_complete("sec-1", now).unwrap();

        let err = s.apply_complete("sec-1", now).unwrap_err();
        assert_eq!(err, TransitionError::WrongState);
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn double_verify_is_already_terminal() {
        let mut s = session(300);
        let now = Utc::now();
        s.apply_verify("sec-1", now).unwrap();
        let err = s.apply_verify("sec-1", now).unwrap_err();
        assert_eq!(err, TransitionError::AlreadyTerminal);
    }

    #[test]
    fn wrong_secret_never_advances_state() {
        let mut s = session(300);
        let now = Utc::now();

        assert_eq!(
            s.apply_verify("bad", now).unwrap_err(),
            TransitionError::SecretMismatch
        );
        assert_eq!(s.status, SessionStatus::Pending);

        s.apply_verify("sec-1", now).unwrap();
        assert_eq!(
            s.apply_complete("bad", now).unwrap_err(),
            TransitionError::SecretMismatch
        );
        assert_eq!(s.status, SessionStatus::Verified);
    }

    #[test]
    fn ttl_is_enforced_at_transition_time() {
        // Negative TTL: born expired without any sweeper involvement.
        let mut s = session(-5);
        let now = Utc::now();

        assert_eq!(
            s.apply_verify("sec-1", now).unwrap_err(),
            TransitionError::Expired
        );
        // The failed transition also marked the record expired.
        assert_eq!(s.status, SessionStatus::Expired);

        assert_eq!(
            s.apply_complete("sec-1", now).unwrap_err(),
            TransitionError::Expired
        );
    }

    #[test]
    fn verified_session_expires_too() {
        let mut s = session(300);
        let now = Utc::now();
        s.apply_verify("sec-1", now).unwrap();

        let late = now + Duration::seconds(600);
        assert_eq!(
            s.apply_complete("sec-1", late).unwrap_err(),
            TransitionError::Expired
        );
        assert_eq!(s.status, SessionStatus::Expired);
    }

    #[test]
    fn mark_expired_never_touches_terminal_sessions() {
        let mut s = session(300);
        let now = Utc::now();
        s.apply_verify("sec-1", now).unwrap();
        s.apply_complete("sec-1", now).unwrap();

        assert!(!s.mark_expired());
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn outstanding_excludes_terminal_and_stale() {
        let now = Utc::now();
        let fresh = session(300);
        assert!(fresh.is_outstanding(now));

        let stale = session(-5);
        assert!(!stale.is_outstanding(now));

        let mut done = session(300);
        done.apply_verify("sec-1", now).unwrap();
        done.apply_complete("sec-1", now).unwrap();
        assert!(!done.is_outstanding(now));
    }

    #[test]
    fn direction_round_trips_through_str() {
        for d in [Direction::PrimaryToSecondary, Direction::SecondaryToPrimary] {
            let parsed: Direction = d.as_str().parse().unwrap();
            assert_eq!(parsed, d);
        }
        assert!("sideways".parse::<Direction>().is_err());
    }
}
