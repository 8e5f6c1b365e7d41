use ledger_core::RetryConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub auth: AuthConfig,
    pub explorer: ExplorerConfig,
    pub channels: ChannelsConfig,
    pub relay: RelayConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub data_dir: String,
    pub pending_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Transfer rail settings
///
/// `confirm_timeout_secs` bounds how long a withdrawal may sit in flight
/// before the coordinator reverses it; it must stay below the ledger's
/// pending timeout or the sweeper wins the race.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub confirm_timeout_secs: u64,
    pub mock_latency_ms: u64,
    pub mock_success_rate: f64,
}

impl Config {
    /// Load configuration from environment variables with `GATEWAY_` prefix
    /// (e.g. `GATEWAY_SERVER__PORT=8080`), layered over built-in defaults.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("ledger.data_dir", "./data/ledger")?
            .set_default("ledger.pending_timeout_secs", 300)?
            .set_default("ledger.sweep_interval_secs", 60)?
            .set_default("auth.jwt_secret", "dev-secret-change-me")?
            .set_default("explorer.base_url", "https://tonapi.io")?
            .set_default("explorer.timeout_secs", 10)?
            .set_default("explorer.max_retries", 3)?
            .set_default("channels.base_url", "http://localhost:8091")?
            .set_default("channels.timeout_secs", 10)?
            .set_default("relay.base_url", "http://localhost:8092")?
            .set_default("relay.timeout_secs", 10)?
            .set_default("transfer.confirm_timeout_secs", 120)?
            .set_default("transfer.mock_latency_ms", 200)?
            .set_default("transfer.mock_success_rate", 0.95)?
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn ledger_config(&self) -> ledger_core::Config {
        let mut cfg = ledger_core::Config::default();
        cfg.data_dir = self.ledger.data_dir.clone().into();
        cfg.pending_timeout_secs = self.ledger.pending_timeout_secs;
        cfg.sweep_interval_secs = self.ledger.sweep_interval_secs;
        cfg
    }

    pub fn explorer_timeout(&self) -> Duration {
        Duration::from_secs(self.explorer.timeout_secs)
    }

    pub fn explorer_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.explorer.max_retries,
            ..RetryConfig::default()
        }
    }

    pub fn channels_timeout(&self) -> Duration {
        Duration::from_secs(self.channels.timeout_secs)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.confirm_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.ledger.sweep_interval_secs)
    }
}
