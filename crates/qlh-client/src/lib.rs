pub mod claimant;
pub mod cli;
pub mod events;
pub mod http;
pub mod poller;

pub use claimant::{ClaimError, Claimant};
pub use cli::Cli;
pub use events::{EventBus, HandoffEvent};
pub use http::{AccessCredential, ApiClient, ClientError, GeneratedHandoff};
pub use poller::{IssuerPoller, PollOutcome, StatusSource};
