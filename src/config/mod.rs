#[allow(clippy::module_inception)]
mod config;

pub use config::{
    CronSettings, LoggingSettings, PostgresSettings, ScannerSettings, ServerSettings, Settings,
    StorageBackend, StorageSettings, SubgraphSettings,
};
