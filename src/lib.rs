pub mod api;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod subgraph;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use cron::CronScheduler;
pub use db::Database;
pub use error::{ScanError, ScanResult};
pub use worker::{BlockScanner, ScanScheduler};
