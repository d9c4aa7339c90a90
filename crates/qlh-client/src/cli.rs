//! CLI command definitions and argument parsing

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

use qlh_core::Direction;

use crate::claimant::Claimant;
use crate::events::{EventBus, HandoffEvent};
use crate::http::ApiClient;
use crate::poller::{IssuerPoller, PollOutcome};

/// QR login handoff client
#[derive(Parser, Debug)]
#[command(name = "qlh-client")]
#[command(version, about = "QR login handoff client - generate, watch, and claim handoff codes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Handoff server base URL
    #[arg(long, env = "QLH_SERVER_URL", default_value = "http://127.0.0.1:8080", global = true)]
    pub server: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a handoff session and print its QR payload
    Generate {
        /// Transfer direction: primary_to_secondary or secondary_to_primary
        #[arg(long, default_value = "primary_to_secondary")]
        direction: Direction,

        /// Issuer bearer token for the generate call
        #[arg(long, env = "QLH_ISSUER_TOKEN")]
        token: String,

        /// Keep running and watch the session until it resolves
        #[arg(long)]
        wait: bool,
    },

    /// Print the current status of a session
    Status {
        /// Session id, as printed by generate
        session_id: String,
    },

    /// Claim a scanned QR payload and print the issued credential
    Claim {
        /// The raw scanned payload string
        payload: String,

        /// Direction this device expects the code to carry
        #[arg(long, default_value = "primary_to_secondary")]
        direction: Direction,
    },
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        let client = ApiClient::new(&self.server)?;

        match self.command {
            Commands::Generate {
                direction,
                token,
                wait,
            } => {
                let generated = client.generate(&token, direction).await?;
                println!("session_id: {}", generated.session_id);
                println!("expires_at: {}", generated.expires_at);
                println!("{}", generated.qr_payload);

                if wait {
                    watch_session(client, &generated.session_id, generated.expires_at).await?;
                }
                Ok(())
            }

            Commands::Status { session_id } => {
                let status = client.status(&session_id).await?;
                println!("{status}");
                Ok(())
            }

            Commands::Claim { payload, direction } => {
                let claimant = Claimant::new(client, direction);
                let credential = claimant.claim(&payload).await?;
                println!("token_type: {}", credential.token_type);
                println!("expires_in: {}", credential.expires_in);
                println!("{}", credential.access_token);
                Ok(())
            }
        }
    }
}

async fn watch_session(
    client: ApiClient,
    session_id: &str,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<()> {
    let events = EventBus::default();
    let mut rx = events.subscribe();

    // Ctrl-C flips the cancel flag instead of killing the process, so
    // the poller reports a clean outcome.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                HandoffEvent::StatusChanged { status, .. } => eprintln!("status: {status}"),
                HandoffEvent::PollFailed { attempt, .. } => {
                    eprintln!("poll failed (attempt {attempt}), retrying")
                }
                _ => {}
            }
        }
    });

    let poller = IssuerPoller::new(Arc::new(client), events);
    let outcome = poller.run(session_id, expires_at, cancel_rx).await;
    printer.abort();

    match outcome {
        PollOutcome::Completed => {
            println!("completed: signed in on the other device");
            Ok(())
        }
        PollOutcome::Expired => anyhow::bail!("code expired before it was used"),
        PollOutcome::Cancelled => anyhow::bail!("cancelled"),
        PollOutcome::Lost => anyhow::bail!("lost contact with the server"),
    }
}
