use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

use qlh_core::StoreConfig;

/// One entry of the bearer-token → user-id map that stands in for the
/// primary authentication system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerToken {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    // Handshake session settings
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub terminal_retention_secs: u64,
    pub per_user_quota: usize,

    // Access credential settings
    pub access_token_ttl_secs: u64,
    pub jwt_secret: String,

    // Authentication for the generate path
    pub issuer_tokens: Vec<IssuerToken>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            session_ttl_secs: 300, // 5 minutes
            sweep_interval_secs: 30,
            terminal_retention_secs: 600,
            per_user_quota: 3,
            access_token_ttl_secs: 900,
            jwt_secret: String::new(),
            issuer_tokens: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("QLH_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        if let Ok(ttl) = std::env::var("QLH_SESSION_TTL_SECS") {
            config.session_ttl_secs = ttl.parse()?;
        }

        if let Ok(interval) = std::env::var("QLH_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = interval.parse()?;
        }

        if let Ok(retention) = std::env::var("QLH_TERMINAL_RETENTION_SECS") {
            config.terminal_retention_secs = retention.parse()?;
        }

        if let Ok(quota) = std::env::var("QLH_PER_USER_QUOTA") {
            config.per_user_quota = quota.parse()?;
        }

        if let Ok(ttl) = std::env::var("QLH_ACCESS_TOKEN_TTL_SECS") {
            config.access_token_ttl_secs = ttl.parse()?;
        }

        if let Ok(secret) = std::env::var("QLH_JWT_SECRET") {
            config.jwt_secret = secret;
        }

        // QLH_ISSUER_TOKENS="token1:userA,token2:userB"
        if let Ok(tokens) = std::env::var("QLH_ISSUER_TOKENS") {
            config.issuer_tokens = tokens
                .split(',')
                .filter_map(|pair| {
                    let (token, user_id) = pair.trim().split_once(':')?;
                    Some(IssuerToken {
                        token: token.to_string(),
                        user_id: user_id.to_string(),
                    })
                })
                .collect();
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session_ttl_secs == 0 {
            anyhow::bail!("session_ttl_secs must be > 0");
        }

        if self.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be > 0");
        }

        if self.per_user_quota == 0 {
            anyhow::bail!("per_user_quota must be > 0");
        }

        if self.access_token_ttl_secs == 0 {
            anyhow::bail!("access_token_ttl_secs must be > 0");
        }

        if self.jwt_secret.is_empty() {
            anyhow::bail!("jwt_secret must be set");
        }

        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            session_ttl: chrono::Duration::seconds(self.session_ttl_secs as i64),
            per_user_quota: self.per_user_quota,
            terminal_retention: chrono::Duration::seconds(self.terminal_retention_secs as i64),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServerConfig {
        ServerConfig {
            jwt_secret: "test-secret".to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn default_is_invalid_without_secret() {
        assert!(ServerConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let mut config = valid();
        config.session_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.sweep_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.per_user_quota = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = valid();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.session_ttl_secs, config.session_ttl_secs);
        assert_eq!(parsed.bind_addr, config.bind_addr);
    }
}
