use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use url::Url;

/// Block scan scheduling parameters.
///
/// `start_block` is the first block that will ever be scanned. The cursor
/// falls back to `start_block - 1` until the scheduler writes it.
#[derive(Debug, Deserialize, Clone)]
pub struct ScannerSettings {
    pub start_block: u64,
    /// Tokens requested from the subgraph per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Maximum number of block scans dispatched by a single pass.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Time budget of a scheduled run. HTTP triggered runs get half of it.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    /// A lease without a heartbeat for this long is presumed dead.
    #[serde(default = "default_liveness_window_ms")]
    pub liveness_window_ms: u64,
}

fn default_page_size() -> usize {
    100
}

fn default_pool_size() -> usize {
    5
}

fn default_time_budget_ms() -> u64 {
    60_000
}

fn default_liveness_window_ms() -> u64 {
    60_000
}

impl ScannerSettings {
    pub fn new(start_block: u64) -> Self {
        Self {
            start_block,
            page_size: default_page_size(),
            pool_size: default_pool_size(),
            time_budget_ms: default_time_budget_ms(),
            liveness_window_ms: default_liveness_window_ms(),
        }
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    /// Cursor value used when none has been persisted yet.
    pub fn cursor_fallback(&self) -> u64 {
        self.start_block.saturating_sub(1)
    }
}

/// Subgraph (indexer) endpoint configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct SubgraphSettings {
    #[serde(default = "default_subgraph_url")]
    pub url: Url,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_subgraph_url() -> Url {
    Url::parse("https://api.thegraph.com/subgraphs/name/nftstorage/eip721-subgraph")
        .expect("default subgraph url is valid")
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for SubgraphSettings {
    fn default() -> Self {
        Self {
            url: default_subgraph_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Public base URL of this service. When set, the scheduler dispatches
    /// block scans as `POST {location}/api/scan/{block}` instead of calling
    /// the scanner in-process.
    #[serde(default)]
    pub location: Option<Url>,
}

fn default_listen() -> String {
    "0.0.0.0:8787".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            location: None,
        }
    }
}

/// Periodic trigger configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct CronSettings {
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

fn default_scan_interval_secs() -> u64 {
    60
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
        }
    }
}

/// PostgreSQL connection configuration for the durable key-value backend.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pg_pool_size")]
    pub pool_size: usize,
}

fn default_pg_pool_size() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: log::LevelFilter,
}

fn default_log_level() -> log::LevelFilter {
    log::LevelFilter::Info
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` (optional) with `NIFTYSCAN__SECTION__KEY`
/// environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub subgraph: SubgraphSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cron: CronSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("NIFTYSCAN").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.start_block == 0 {
            return Err(ConfigError::Message(
                "scanner.start_block must be greater than 0".to_string(),
            ));
        }
        if self.scanner.page_size == 0 {
            return Err(ConfigError::Message(
                "scanner.page_size must be greater than 0".to_string(),
            ));
        }
        if self.scanner.pool_size == 0 {
            return Err(ConfigError::Message(
                "scanner.pool_size must be greater than 0".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres.is_none() {
            return Err(ConfigError::Message(
                "storage.postgres must be set when storage.backend is postgres".to_string(),
            ));
        }
        Ok(())
    }
}
