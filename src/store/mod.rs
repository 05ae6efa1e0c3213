//! Embedded SQLite storage
//!
//! Holds the two tables the host owns: `app_config` for runtime tunables and
//! `app_log` for log rows written by the UI process.

mod config_store;
mod database;
mod error;
mod log_store;
pub mod schema;

pub use config_store::{ConfigDefault, ConfigEntry, ConfigSource, ConfigStore};
pub use database::Database;
pub use error::StoreError;
pub use log_store::{LogQuery, LogRow, LogStore, NewLogRow};
