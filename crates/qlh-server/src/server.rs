use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use qlh_core::{MemoryStore, Store};

use crate::api::{create_router, AppState};
use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::credential::CredentialIssuer;
use crate::metrics::HandoffMetrics;

pub struct HandoffServer {
    config: ServerConfig,
    store: Arc<MemoryStore>,
    auth: AuthConfig,
    credentials: Arc<CredentialIssuer>,
    metrics: Arc<HandoffMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl HandoffServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Arc::new(MemoryStore::new(config.store_config()));
        let auth = {
            let mut auth = AuthConfig::new();
            for entry in &config.issuer_tokens {
                auth.add_token(entry.token.clone(), entry.user_id.clone());
            }
            auth
        };
        let credentials = Arc::new(CredentialIssuer::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
        ));
        let metrics = Arc::new(HandoffMetrics::new()?);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            auth,
            credentials,
            metrics,
            shutdown_tx,
        })
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        if self.config.issuer_tokens.is_empty() {
            warn!("no issuer tokens configured, every generate call will be rejected");
        }

        // Start sweeper task
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let metrics = Arc::clone(&self.metrics);
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(Self::sweeper_task(store, config, metrics, shutdown_rx));

        let state = AppState {
            store: self.store.clone(),
            auth: self.auth.clone(),
            credentials: Arc::clone(&self.credentials),
            metrics: Arc::clone(&self.metrics),
        };

        let app = create_router(state).layer(TraceLayer::new_for_http());

        let shutdown_rx = self.shutdown_tx.subscribe();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("qlh-server listening on {}", self.config.bind_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal(shutdown_rx))
            .await?;

        Ok(())
    }

    // Periodic maintenance: mark stale sessions expired, then delete
    // terminal sessions past retention. Sessions a client never touches
    // again still reach `expired` this way.
    async fn sweeper_task(
        store: Arc<MemoryStore>,
        config: ServerConfig,
        metrics: Arc<HandoffMetrics>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let swept = match store.sweep_expired().await {
                        Ok(n) => n,
                        Err(e) => {
                            warn!(error = %e, "sweep failed");
                            0
                        }
                    };
                    let purged = match store.purge_terminal().await {
                        Ok(n) => n,
                        Err(e) => {
                            warn!(error = %e, "purge failed");
                            0
                        }
                    };

                    metrics.sessions_expired.inc_by(swept as f64);
                    metrics.sessions_purged.inc_by(purged as f64);
                    metrics.active_sessions.set(store.len().await as f64);

                    if swept > 0 || purged > 0 {
                        info!("swept {} sessions to expired, purged {} terminal sessions", swept, purged);
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender means the server is gone; stop
                    // instead of spinning on a closed channel.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
