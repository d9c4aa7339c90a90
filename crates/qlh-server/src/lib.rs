pub mod api;
pub mod auth;
pub mod config;
pub mod credential;
pub mod metrics;
pub mod server;

pub use server::HandoffServer;
