use proptest::prelude::*;

use crate::payload::QrPayload;
use crate::session::{Direction, HandshakeSession, SessionStatus, TransitionError};

fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::PrimaryToSecondary),
        Just(Direction::SecondaryToPrimary),
    ]
}

proptest! {
    // Property: encode/decode round-trips the (type, session_id,
    // secret_token) triple exactly, whatever the token contents.
    #[test]
    fn payload_round_trip(
        direction in direction_strategy(),
        session_id in "[a-zA-Z0-9_-]{1,64}",
        secret_token in "[a-zA-Z0-9_-]{1,128}",
    ) {
        let original = QrPayload { direction, session_id, secret_token };
        let decoded = QrPayload::decode(&original.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, original);
    }

    // Property: arbitrary scanned garbage is rejected, never partially
    // processed and never a panic.
    #[test]
    fn decode_never_panics(raw in ".{0,256}") {
        if let Ok(payload) = QrPayload::decode(&raw) {
            prop_assert!(!payload.session_id.is_empty());
            prop_assert!(!payload.secret_token.is_empty());
        }
    }
}

proptest! {
    // Property: however the claimant interleaves calls, status never
    // moves backward and never skips from pending straight to completed.
    #[test]
    fn transitions_are_monotonic(
        ops in prop::collection::vec(0..2u8, 1..12),
        ttl_secs in -10i64..600,
    ) {
        let now = chrono::Utc::now();
        let mut session = HandshakeSession::new(
            "sid".to_string(),
            "secret".to_string(),
            Direction::PrimaryToSecondary,
            "owner".to_string(),
            chrono::Duration::seconds(ttl_secs),
            now,
        );

        let rank = |s: SessionStatus| match s {
            SessionStatus::Pending => 0,
            SessionStatus::Verified => 1,
            // Terminal states share the top rank; neither yields to the other.
            SessionStatus::Completed | SessionStatus::Expired => 2,
        };

        let mut completions = 0;
        for op in ops {
            let before = session.status;
            let result = if op == 0 {
                session.apply_verify("secret", now)
            } else {
                let r = session.apply_complete("secret", now);
                if r.is_ok() {
                    prop_assert_eq!(before, SessionStatus::Verified);
                    completions += 1;
                }
                r
            };
            prop_assert!(rank(session.status) >= rank(before));
            if before.is_terminal() {
                prop_assert!(result.is_err());
                prop_assert_eq!(session.status, before);
            }
        }
        prop_assert!(completions <= 1);

        // Past-TTL sessions only ever end up expired.
        if ttl_secs < 0 {
            prop_assert_ne!(session.status, SessionStatus::Completed);
        }
    }

    // Property: a wrong secret is inert, no state change ever.
    #[test]
    fn wrong_secret_is_inert(ops in prop::collection::vec(0..2u8, 1..8)) {
        let now = chrono::Utc::now();
        let mut session = HandshakeSession::new(
            "sid".to_string(),
            "secret".to_string(),
            Direction::PrimaryToSecondary,
            "owner".to_string(),
            chrono::Duration::seconds(300),
            now,
        );

        for op in ops {
            let before = session.status;
            let result = if op == 0 {
                session.apply_verify("intruder", now)
            } else {
                session.apply_complete("intruder", now)
            };
            prop_assert_eq!(result.unwrap_err(), TransitionError::SecretMismatch);
            prop_assert_eq!(session.status, before);
        }
    }
}
