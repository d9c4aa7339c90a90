//! Core protocol for QR login handoff.
//!
//! A short-lived server-side session, identified by an unguessable pair
//! of tokens, carries a login from an already-authenticated device to a
//! second device via a scanned QR code. This crate holds everything
//! both sides of that handshake agree on: the session data model and
//! its state machine, the storage abstraction with atomic transitions,
//! the QR payload codec, and token generation.

pub mod payload;
pub mod session;
pub mod store;
pub mod token;

#[cfg(test)]
mod payload_props;

pub use payload::{PayloadError, QrPayload};
pub use session::{Direction, HandshakeSession, SessionStatus, TransitionError};
pub use store::{MemoryStore, Store, StoreConfig, StoreError};
