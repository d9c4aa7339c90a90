//! Issuer-side status poller.
//!
//! After generating a session the granting device renders the QR code
//! and watches the session from here until it resolves. The poller
//! owns no UI: it publishes lifecycle events on the bus and returns a
//! single terminal outcome.
//!
//! Expiry is enforced locally as well as remotely. The server only
//! marks stale sessions on its sweep cadence, so the poller stops at
//! the session's own deadline instead of waiting for the sweeper to
//! catch up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use qlh_core::SessionStatus;

use crate::events::{EventBus, HandoffEvent};
use crate::http::{ApiClient, ClientError};

/// Where status readings come from. The HTTP client is the production
/// source; tests substitute a scripted one.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, session_id: &str) -> Result<SessionStatus, ClientError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn status(&self, session_id: &str) -> Result<SessionStatus, ClientError> {
        ApiClient::status(self, session_id).await
    }
}

/// Terminal result of one polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A claimant exchanged the session for a credential.
    Completed,
    /// The session lapsed, locally or by server report.
    Expired,
    /// The caller cancelled the run.
    Cancelled,
    /// Too many consecutive poll failures; session state unknown.
    Lost,
}

pub struct IssuerPoller<S> {
    source: Arc<S>,
    interval: Duration,
    max_consecutive_failures: u32,
    events: EventBus,
}

impl<S: StatusSource> IssuerPoller<S> {
    pub fn new(source: Arc<S>, events: EventBus) -> Self {
        Self {
            source,
            interval: Duration::from_secs(2),
            max_consecutive_failures: 5,
            events,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Poll until the session resolves, the deadline passes, or the
    /// caller flips `cancel`.
    pub async fn run(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        mut cancel: watch::Receiver<bool>,
    ) -> PollOutcome {
        let mut last_seen: Option<SessionStatus> = None;
        let mut consecutive_failures = 0u32;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if Utc::now() >= expires_at {
                        debug!(session_id = %session_id, "session deadline passed, stopping poll");
                        self.events.publish(HandoffEvent::Expired {
                            session_id: session_id.to_string(),
                        });
                        return PollOutcome::Expired;
                    }

                    match self.source.status(session_id).await {
                        Ok(status) => {
                            consecutive_failures = 0;
                            if last_seen != Some(status) {
                                last_seen = Some(status);
                                self.events.publish(HandoffEvent::StatusChanged {
                                    session_id: session_id.to_string(),
                                    status,
                                });
                            }
                            match status {
                                SessionStatus::Completed => {
                                    self.events.publish(HandoffEvent::Completed {
                                        session_id: session_id.to_string(),
                                    });
                                    return PollOutcome::Completed;
                                }
                                SessionStatus::Expired => {
                                    self.events.publish(HandoffEvent::Expired {
                                        session_id: session_id.to_string(),
                                    });
                                    return PollOutcome::Expired;
                                }
                                // Verified keeps the QR display open in
                                // its "approve on the other device"
                                // phase, so polling continues.
                                SessionStatus::Pending | SessionStatus::Verified => {}
                            }
                        }
                        // The server no longer knows the session, which
                        // after a purge is indistinguishable from expiry.
                        Err(ClientError::InvalidOrExpired) => {
                            self.events.publish(HandoffEvent::Expired {
                                session_id: session_id.to_string(),
                            });
                            return PollOutcome::Expired;
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            warn!(session_id = %session_id, error = %e, attempt = consecutive_failures, "poll failed");
                            self.events.publish(HandoffEvent::PollFailed {
                                session_id: session_id.to_string(),
                                attempt: consecutive_failures,
                            });
                            if consecutive_failures >= self.max_consecutive_failures {
                                return PollOutcome::Lost;
                            }
                        }
                    }
                }
                changed = cancel.changed() => {
                    // A closed channel is teardown by drop; it cancels
                    // the same as an explicit signal.
                    if changed.is_err() || *cancel.borrow() {
                        return PollOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted source: pops readings in order, then holds at the last
    /// default (pending).
    struct ScriptedSource {
        readings: Mutex<VecDeque<Result<SessionStatus, ClientError>>>,
    }

    impl ScriptedSource {
        fn new(readings: Vec<Result<SessionStatus, ClientError>>) -> Arc<Self> {
            Arc::new(Self {
                readings: Mutex::new(readings.into()),
            })
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn status(&self, _session_id: &str) -> Result<SessionStatus, ClientError> {
            self.readings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SessionStatus::Pending))
        }
    }

    fn poller(source: Arc<ScriptedSource>, events: EventBus) -> IssuerPoller<ScriptedSource> {
        IssuerPoller::new(source, events).with_interval(Duration::from_millis(10))
    }

    fn far_future() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the whole test.
        std::mem::forget(tx);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_completed_and_reports_each_change() {
        let source = ScriptedSource::new(vec![
            Ok(SessionStatus::Pending),
            Ok(SessionStatus::Verified),
            Ok(SessionStatus::Completed),
        ]);
        let events = EventBus::new(16);
        let mut rx = events.subscribe();

        let outcome = poller(source, events)
            .run("sid-1", far_future(), no_cancel())
            .await;
        assert_eq!(outcome, PollOutcome::Completed);

        let mut statuses = Vec::new();
        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                HandoffEvent::StatusChanged { status, .. } => statuses.push(status),
                HandoffEvent::Completed { .. } => completed = true,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Pending,
                SessionStatus::Verified,
                SessionStatus::Completed
            ]
        );
        assert!(completed);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_local_deadline_without_server_help() {
        let source = ScriptedSource::new(vec![]);
        let events = EventBus::new(16);
        let mut rx = events.subscribe();

        let deadline = Utc::now() - chrono::Duration::seconds(1);
        let outcome = poller(source, events).run("sid-1", deadline, no_cancel()).await;

        assert_eq!(outcome, PollOutcome::Expired);
        assert!(matches!(rx.try_recv(), Ok(HandoffEvent::Expired { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_is_treated_as_expired() {
        let source = ScriptedSource::new(vec![Err(ClientError::InvalidOrExpired)]);
        let events = EventBus::new(16);

        let outcome = poller(source, events)
            .run("sid-1", far_future(), no_cancel())
            .await;
        assert_eq!(outcome, PollOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_tolerated() {
        let source = ScriptedSource::new(vec![
            Err(ClientError::Transport("connection refused".to_string())),
            Err(ClientError::Server(503)),
            Ok(SessionStatus::Completed),
        ]);
        let events = EventBus::new(16);
        let mut rx = events.subscribe();

        let outcome = poller(source, events)
            .run("sid-1", far_future(), no_cancel())
            .await;
        assert_eq!(outcome, PollOutcome::Completed);

        let mut failures = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, HandoffEvent::PollFailed { .. }) {
                failures += 1;
            }
        }
        assert_eq!(failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failures_give_up() {
        let source = ScriptedSource::new(vec![
            Err(ClientError::Transport("down".to_string())),
            Err(ClientError::Transport("down".to_string())),
            Err(ClientError::Transport("down".to_string())),
        ]);
        let events = EventBus::new(16);

        let outcome = poller(source, events)
            .with_max_consecutive_failures(3)
            .run("sid-1", far_future(), no_cancel())
            .await;
        assert_eq!(outcome, PollOutcome::Lost);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_run() {
        let source = ScriptedSource::new(vec![]);
        let events = EventBus::new(16);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let poller = poller(source, events);
        let handle = tokio::spawn(async move {
            poller.run("sid-1", far_future(), cancel_rx).await
        });

        cancel_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), PollOutcome::Cancelled);
    }

    // Dropping the only sender is the natural teardown path; the run
    // must stop instead of polling until the deadline.
    #[tokio::test(start_paused = true)]
    async fn dropping_the_cancel_sender_counts_as_cancellation() {
        let source = ScriptedSource::new(vec![]);
        let events = EventBus::new(16);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        drop(cancel_tx);

        let outcome = poller(source, events)
            .run("sid-1", far_future(), cancel_rx)
            .await;
        assert_eq!(outcome, PollOutcome::Cancelled);
    }
}
