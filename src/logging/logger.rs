//! Leveled file logger
//!
//! The logger is an explicit value: construct it once at startup and hand it
//! to every call site (usually as `Arc<Logger>`). Configuration is applied in a
//! second, awaited step:
//!
//! 1. [`Logger::new`] starts from the built-in defaults (INFO, 10 MiB, 10 files).
//! 2. [`Logger::apply_config`] reads overrides from a [`ConfigSource`].
//!
//! Calls made before step 2 completes use the defaults.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::keys;
use crate::store::{ConfigSource, StoreError};

use super::error::LogError;
use super::level::{LogEntry, LogLevel};
use super::rotation::{self, RotationOutcome};

/// Default size at which the active file is rotated (10 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rotated files kept on disk
pub const DEFAULT_MAX_FILES: usize = 10;

/// File name used when no explicit log file is configured: `app_<YYYYMMDD>.log`
pub fn default_file_name() -> String {
    format!("app_{}.log", Utc::now().format("%Y%m%d"))
}

/// `<cwd>/logs/app_<YYYYMMDD>.log`
pub fn default_log_path() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join("logs").join(default_file_name())
}

/// Where the logger writes and when it rotates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationState {
    pub active_path: PathBuf,
    pub max_bytes: u64,
    pub max_files: usize,
}

#[derive(Debug)]
struct LoggerState {
    level: LogLevel,
    rotation: RotationState,
}

/// Leveled logger writing to a rotating file
#[derive(Debug)]
pub struct Logger {
    state: Mutex<LoggerState>,
}

impl Logger {
    /// Create a logger with default thresholds.
    ///
    /// Without an explicit path the logger writes to [`default_log_path`].
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            state: Mutex::new(LoggerState {
                level: LogLevel::default(),
                rotation: RotationState {
                    active_path: path.unwrap_or_else(default_log_path),
                    max_bytes: DEFAULT_MAX_BYTES,
                    max_files: DEFAULT_MAX_FILES,
                },
            }),
        }
    }

    /// Set the minimum level that will be written
    pub fn set_level(&self, level: LogLevel) {
        self.state.lock().level = level;
    }

    pub fn level(&self) -> LogLevel {
        self.state.lock().level
    }

    /// Path of the file currently receiving writes
    pub fn active_path(&self) -> PathBuf {
        self.state.lock().rotation.active_path.clone()
    }

    /// Snapshot of the current rotation settings
    pub fn rotation_state(&self) -> RotationState {
        self.state.lock().rotation.clone()
    }

    pub fn debug(&self, message: impl AsRef<str>) -> Result<(), LogError> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: impl AsRef<str>) -> Result<(), LogError> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl AsRef<str>) -> Result<(), LogError> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: impl AsRef<str>) -> Result<(), LogError> {
        self.log(LogLevel::Error, message)
    }

    pub fn critical(&self, message: impl AsRef<str>) -> Result<(), LogError> {
        self.log(LogLevel::Critical, message)
    }

    /// Write `message` at `level` if it passes the threshold, then rotate if
    /// the file grew past its limit.
    ///
    /// Filesystem failures are returned to the caller untouched.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) -> Result<(), LogError> {
        // Held across write and rotation so a rename never splits a write
        let state = self.state.lock();
        if !level.passes(state.level) {
            return Ok(());
        }

        let entry = LogEntry::new(level, message.as_ref());
        let path = &state.rotation.active_path;
        append_line(path, &entry.to_line())?;

        if let Some(RotationOutcome {
            rotated_to,
            evicted,
        }) = rotation::rotate_if_needed(path, state.rotation.max_bytes, state.rotation.max_files)?
        {
            debug!(
                rotated_to = %rotated_to.display(),
                evicted = ?evicted,
                "rotated application log"
            );
        }
        Ok(())
    }

    /// Load overrides from `source` and apply them.
    ///
    /// Lookups run on the blocking pool. Any failure leaves the logger on its
    /// current settings.
    /// Returns the overrides that were applied.
    pub async fn apply_config(&self, source: Arc<dyn ConfigSource>) -> LoggerOverrides {
        let loaded =
            tokio::task::spawn_blocking(move || LoggerOverrides::load(source.as_ref())).await;

        let overrides = match loaded {
            Ok(Ok(overrides)) => overrides,
            Ok(Err(e)) => {
                debug!(error = %e, "logger configuration unavailable, keeping defaults");
                return LoggerOverrides::default();
            }
            Err(e) => {
                debug!(error = %e, "logger configuration task failed, keeping defaults");
                return LoggerOverrides::default();
            }
        };

        self.apply(&overrides);
        overrides
    }

    /// Apply already-loaded overrides; absent fields keep their current value
    pub fn apply(&self, overrides: &LoggerOverrides) {
        let mut state = self.state.lock();
        if let Some(level) = overrides.level {
            state.level = level;
        }
        if let Some(path) = &overrides.path {
            state.rotation.active_path = path.clone();
        }
        if let Some(max_bytes) = overrides.max_bytes {
            state.rotation.max_bytes = max_bytes;
        }
        if let Some(max_files) = overrides.max_files {
            state.rotation.max_files = max_files;
        }
    }
}

/// Logger settings read from the configuration store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerOverrides {
    pub level: Option<LogLevel>,
    pub path: Option<PathBuf>,
    pub max_bytes: Option<u64>,
    pub max_files: Option<usize>,
}

impl LoggerOverrides {
    /// Read `log_level`, `log_path`, `max_log_size` and `max_log_files`.
    ///
    /// A missing row or a malformed value leaves that field unset, as does a
    /// `log_path` whose directory cannot be created. A failing source aborts
    /// the whole load.
    pub fn load(source: &dyn ConfigSource) -> Result<Self, StoreError> {
        let mut overrides = LoggerOverrides::default();

        if let Some(raw) = non_empty(source.config_value(keys::LOG_LEVEL)?) {
            match raw.parse::<LogLevel>() {
                Ok(level) => overrides.level = Some(level),
                Err(e) => debug!(error = %e, "ignoring configured log level"),
            }
        }

        if let Some(raw) = non_empty(source.config_value(keys::LOG_PATH)?) {
            let path = resolve_log_path(&raw);
            let usable = match path.parent() {
                Some(parent) => match fs::create_dir_all(parent) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            path = %parent.display(),
                            error = %e,
                            "ignoring configured log_path"
                        );
                        false
                    }
                },
                None => true,
            };
            if usable {
                overrides.path = Some(path);
            }
        }

        if let Some(raw) = non_empty(source.config_value(keys::MAX_LOG_SIZE)?) {
            match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => overrides.max_bytes = Some(n),
                _ => debug!(value = %raw, "ignoring configured max_log_size"),
            }
        }

        if let Some(raw) = non_empty(source.config_value(keys::MAX_LOG_FILES)?) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => overrides.max_files = Some(n),
                _ => debug!(value = %raw, "ignoring configured max_log_files"),
            }
        }

        Ok(overrides)
    }
}

/// Turn a configured `log_path` into a file path.
///
/// Values ending in `.log` name the file itself; anything else is treated as a
/// directory that receives the default dated file name. A leading `~` expands
/// to the home directory.
pub fn resolve_log_path(raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw.trim()).into_owned());
    if expanded.extension().is_some_and(|ext| ext == "log") {
        expanded
    } else {
        expanded.join(default_file_name())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Append one line, creating the parent directory on demand
fn append_line(path: &Path, line: &str) -> Result<(), LogError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| LogError::io(parent, e))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LogError::io(path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| LogError::io(path, e))?;
    Ok(())
}
