//! Command bridge for the UI process
//!
//! The UI runs sandboxed and reaches the host only through this fixed set of
//! typed commands. No command accepts raw SQL.

pub mod fs_ops;
pub mod server;

pub use server::{BridgeAuth, ServerHandle, COMMAND_ROUTE, TOKEN_HEADER};

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::logging::{LogLevel, Logger};
use crate::store::{ConfigStore, LogQuery, LogStore, NewLogRow, StoreError};

/// A request from the UI process, tagged by `op`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Append a row to the database log
    InsertLog(NewLogRow),
    /// Read database log rows, newest first
    QueryLogs(LogQuery),
    /// Read one configuration entry by exact key
    GetConfig { key: String },
    /// List configuration entries whose key contains `key`
    ListConfig {
        #[serde(default)]
        key: Option<String>,
    },
    /// Count configuration entries whose key contains `key`
    CountConfig {
        #[serde(default)]
        key: Option<String>,
    },
    /// Update an existing configuration entry
    SetConfig {
        key: String,
        value: String,
        #[serde(default)]
        description: Option<String>,
    },
    /// Write a UTF-8 text file, creating the directory if needed
    SaveFile {
        dir: PathBuf,
        filename: String,
        content: String,
    },
    /// Move a directory, merging into the destination if it already exists
    MoveDirectory { old_path: PathBuf, new_path: PathBuf },
}

impl Command {
    /// Operation name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::InsertLog(_) => "insert_log",
            Command::QueryLogs(_) => "query_logs",
            Command::GetConfig { .. } => "get_config",
            Command::ListConfig { .. } => "list_config",
            Command::CountConfig { .. } => "count_config",
            Command::SetConfig { .. } => "set_config",
            Command::SaveFile { .. } => "save_file",
            Command::MoveDirectory { .. } => "move_directory",
        }
    }
}

/// Reply sent back to the UI process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Errors raised while executing a command
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything a command needs from the host
pub struct BridgeContext {
    pub config: ConfigStore,
    pub logs: LogStore,
    pub logger: Arc<Logger>,
}

impl BridgeContext {
    pub fn new(config: ConfigStore, logs: LogStore, logger: Arc<Logger>) -> Self {
        Self {
            config,
            logs,
            logger,
        }
    }

    /// Execute a command. Failures are written to the file log at ERROR and
    /// returned to the caller as an unsuccessful response.
    pub fn dispatch(&self, command: Command) -> Response {
        let op = command.name();
        match self.execute(command) {
            Ok(data) => Response::ok(data),
            Err(e) => {
                if let Err(log_err) = self.logger.error(format!("Command {op} failed: {e}")) {
                    warn!(error = %log_err, "could not write to application log");
                }
                Response::failure(e.to_string())
            }
        }
    }

    fn execute(&self, command: Command) -> Result<Value, BridgeError> {
        match command {
            Command::InsertLog(mut row) => {
                let level = row
                    .level
                    .parse::<LogLevel>()
                    .map_err(|e| BridgeError::InvalidInput(e.to_string()))?;
                row.level = level.as_str().to_string();
                let id = self.logs.insert(&row)?;
                Ok(json!({ "id": id }))
            }
            Command::QueryLogs(query) => Ok(serde_json::to_value(self.logs.query(&query)?)?),
            Command::GetConfig { key } => Ok(serde_json::to_value(self.config.get(&key)?)?),
            Command::ListConfig { key } => {
                Ok(serde_json::to_value(self.config.list(key.as_deref())?)?)
            }
            Command::CountConfig { key } => {
                Ok(json!({ "count": self.config.count(key.as_deref())? }))
            }
            Command::SetConfig {
                key,
                value,
                description,
            } => {
                let entry = self.config.update(&key, &value, description.as_deref())?;
                self.note_info(format!("Configuration updated: {key}"));
                Ok(serde_json::to_value(entry)?)
            }
            Command::SaveFile {
                dir,
                filename,
                content,
            } => {
                let path = fs_ops::save_file(&dir, &filename, &content)?;
                self.note_info(format!("File saved: {}", path.display()));
                Ok(json!({ "file_path": path }))
            }
            Command::MoveDirectory { old_path, new_path } => {
                let merged = fs_ops::move_directory(&old_path, &new_path)?;
                self.note_info(format!(
                    "Directory moved from {} to {}{}",
                    old_path.display(),
                    new_path.display(),
                    if merged { " (merged)" } else { "" }
                ));
                Ok(json!({ "old_path": old_path, "new_path": new_path, "merged": merged }))
            }
        }
    }

    fn note_info(&self, message: String) {
        if let Err(e) = self.logger.info(message) {
            warn!(error = %e, "could not write to application log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConfigDefault, Database};
    use std::fs;
    use tempfile::TempDir;

    fn context(temp_dir: &TempDir) -> BridgeContext {
        let db = Database::in_memory().unwrap();
        let config = ConfigStore::new(db.clone());
        config
            .seed_defaults(&[
                ConfigDefault::new("theme", "system", "default theme"),
                ConfigDefault::new("log_level", "INFO", "default log level"),
            ])
            .unwrap();
        let logger = Arc::new(Logger::new(Some(temp_dir.path().join("app.log"))));
        BridgeContext::new(config, LogStore::new(db), logger)
    }

    #[test]
    fn test_command_parsing() {
        let json = r#"{"op":"insert_log","level":"WARN","event":"ui.render","message":"slow frame","cost_time":18.5}"#;
        let command: Command = serde_json::from_str(json).unwrap();
        assert_eq!(command.name(), "insert_log");
        match command {
            Command::InsertLog(row) => {
                assert_eq!(row.level, "WARN");
                assert_eq!(row.context, None);
                assert_eq!(row.cost_time, Some(18.5));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let command: Command = serde_json::from_str(r#"{"op":"list_config"}"#).unwrap();
        assert_eq!(command, Command::ListConfig { key: None });
    }

    #[test]
    fn test_raw_sql_is_not_a_command() {
        let json = r#"{"op":"sql","sql":"DROP TABLE app_log","params":[]}"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }

    #[test]
    fn test_insert_and_query_logs() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let response = ctx.dispatch(Command::InsertLog(NewLogRow {
            level: "warning".to_string(),
            event: "ui.render".to_string(),
            message: "slow frame".to_string(),
            context: Some("route=/settings".to_string()),
            cost_time: Some(42.0),
        }));
        assert!(response.success);

        let response = ctx.dispatch(Command::QueryLogs(LogQuery {
            level: Some("WARN".to_string()),
            ..Default::default()
        }));
        let rows = response.data.unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["event"], "ui.render");
        assert_eq!(rows[0]["level"], "WARN");
    }

    #[test]
    fn test_insert_log_rejects_unknown_level() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let response = ctx.dispatch(Command::InsertLog(NewLogRow {
            level: "LOUD".to_string(),
            event: "x".to_string(),
            message: "y".to_string(),
            ..Default::default()
        }));
        assert!(!response.success);
        assert!(response.error.unwrap().contains("unknown log level"));
        assert_eq!(ctx.logs.count().unwrap(), 0);

        // The failure is recorded in the file log
        let content = fs::read_to_string(temp_dir.path().join("app.log")).unwrap();
        assert!(content.starts_with("[ERROR] Command insert_log failed"));
    }

    #[test]
    fn test_config_commands() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let response = ctx.dispatch(Command::GetConfig {
            key: "theme".to_string(),
        });
        assert_eq!(response.data.unwrap()["value"], "system");

        let response = ctx.dispatch(Command::SetConfig {
            key: "theme".to_string(),
            value: "dark".to_string(),
            description: None,
        });
        assert!(response.success);
        assert_eq!(ctx.config.value("theme").unwrap().as_deref(), Some("dark"));

        let response = ctx.dispatch(Command::CountConfig { key: None });
        assert_eq!(response.data.unwrap()["count"], 2);

        let response = ctx.dispatch(Command::ListConfig {
            key: Some("log".to_string()),
        });
        assert_eq!(response.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_get_missing_config_returns_null() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let response = ctx.dispatch(Command::GetConfig {
            key: "nope".to_string(),
        });
        assert!(response.success);
        assert_eq!(response.data, Some(Value::Null));
    }

    #[test]
    fn test_set_unknown_config_fails() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let response = ctx.dispatch(Command::SetConfig {
            key: "not_seeded".to_string(),
            value: "1".to_string(),
            description: None,
        });
        assert!(!response.success);
        assert!(response.error.unwrap().contains("does not exist"));
        assert_eq!(ctx.config.count(None).unwrap(), 2);
    }

    #[test]
    fn test_save_file_command() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);
        let dir = temp_dir.path().join("exports");

        let response = ctx.dispatch(Command::SaveFile {
            dir: dir.clone(),
            filename: "notes.txt".to_string(),
            content: "hello".to_string(),
        });
        assert!(response.success);
        assert_eq!(fs::read_to_string(dir.join("notes.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Response::failure("boom")).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"boom"}"#);
    }
}
