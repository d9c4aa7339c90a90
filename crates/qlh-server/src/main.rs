use qlh_server::config::ServerConfig;
use qlh_server::HandoffServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = if let Ok(path) = std::env::var("QLH_CONFIG_PATH") {
        ServerConfig::from_toml(path)?
    } else {
        ServerConfig::from_env()?
    };

    // Create and start server
    let server = HandoffServer::new(config)?;
    server.start().await?;

    Ok(())
}
