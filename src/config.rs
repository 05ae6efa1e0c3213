//! Configuration management for NimiSora
//!
//! Two layers of configuration exist:
//! - `host.toml`: bootstrap settings the host needs before the database is
//!   open (bridge port and the like).
//! - the `app_config` table: runtime tunables, seeded from
//!   [`default_config_entries`] and editable from the UI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::store::ConfigDefault;

/// Keys recognized in the `app_config` table
pub mod keys {
    pub const APP_NAME: &str = "app_name";
    pub const APP_VERSION: &str = "app_version";
    pub const THEME: &str = "theme";
    pub const TEMP_FILE_PATH: &str = "temp_file_path";
    pub const LOG_LEVEL: &str = "log_level";
    pub const LOG_PATH: &str = "log_path";
    pub const MAX_LOG_SIZE: &str = "max_log_size";
    pub const MAX_LOG_FILES: &str = "max_log_files";
    pub const MAX_DATABASE_LOG_NUM: &str = "max_database_log_num";
    pub const DATABASE_LOG_AUTO_CLEAR: &str = "database_log_auto_clear";
    pub const DATABASE_LOG_CLEAR_DAYS: &str = "database_log_clear_days";
}

/// Application name, used for the data directory and the database file
pub const APP_NAME: &str = "NimiSora";

/// Environment variable selecting the development layout when set to `development`
pub const ENV_VAR: &str = "NIMISORA_ENV";

const HOST_CONFIG_FILE: &str = "host.toml";
const BRIDGE_TOKEN_FILE: &str = "bridge.token";

/// Bootstrap configuration read from `host.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Port for the UI command bridge (bound to 127.0.0.1)
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,

    /// Whether to start the command bridge at all
    #[serde(default = "default_open_bridge")]
    pub open_bridge: bool,
}

fn default_bridge_port() -> u16 {
    17871
}

fn default_open_bridge() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bridge_port: default_bridge_port(),
            open_bridge: default_open_bridge(),
        }
    }
}

impl HostConfig {
    /// Load configuration from file, or return default if not found
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read host config")?;
            toml::from_str(&content).context("Failed to parse host config")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize host config")?;
        std::fs::write(path, content).context("Failed to write host config")?;
        Ok(())
    }
}

/// Whether the host runs with the development directory layout.
///
/// True for debug builds or when `NIMISORA_ENV=development`.
pub fn is_development() -> bool {
    cfg!(debug_assertions)
        || std::env::var(ENV_VAR)
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false)
}

/// Directories and files the host works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub base_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub database_path: PathBuf,
    pub host_config_path: PathBuf,
    /// Per-launch bridge token handed to the UI process
    pub bridge_token_path: PathBuf,
}

impl AppPaths {
    /// Lay out all paths under `base`
    pub fn from_base(base: impl Into<PathBuf>) -> Self {
        let base_dir = base.into();
        let data_dir = base_dir.join("data");
        Self {
            logs_dir: base_dir.join("logs"),
            temp_dir: base_dir.join("temp"),
            database_path: data_dir.join(format!("{APP_NAME}.db")),
            host_config_path: base_dir.join(HOST_CONFIG_FILE),
            bridge_token_path: base_dir.join(BRIDGE_TOKEN_FILE),
            data_dir,
            base_dir,
        }
    }

    /// Development uses the working directory; installed builds use the
    /// platform data directory.
    pub fn resolve(dev: bool) -> Self {
        if dev {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self::from_base(cwd)
        } else {
            Self::from_base(installed_base_dir())
        }
    }
}

/// Get the per-user data directory (e.g. ~/.local/share/NimiSora).
/// Falls back to ./.nimisora if the platform directory cannot be determined
pub fn installed_base_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| {
            tracing::warn!("Could not determine data directory, using current directory");
            PathBuf::from(".nimisora")
        })
}

/// Ensure all required directories exist
pub fn ensure_directories(paths: &AppPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.base_dir).context("Failed to create base directory")?;
    std::fs::create_dir_all(&paths.logs_dir).context("Failed to create logs directory")?;
    std::fs::create_dir_all(&paths.data_dir).context("Failed to create data directory")?;
    std::fs::create_dir_all(&paths.temp_dir).context("Failed to create temp directory")?;
    Ok(())
}

/// Write the bridge token where the UI process can read it.
///
/// On Unix the file is readable by the owner only.
pub fn write_bridge_token(path: &Path, token: &str) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .context("Failed to open bridge token file")?;
    file.write_all(token.as_bytes())
        .context("Failed to write bridge token file")?;
    Ok(())
}

/// Rows seeded into `app_config` on first start
pub fn default_config_entries(paths: &AppPaths) -> Vec<ConfigDefault> {
    vec![
        ConfigDefault::new(keys::APP_NAME, APP_NAME, "application name"),
        ConfigDefault::new(
            keys::APP_VERSION,
            env!("CARGO_PKG_VERSION"),
            "application version",
        ),
        ConfigDefault::new(keys::THEME, "system", "default theme"),
        ConfigDefault::new(
            keys::TEMP_FILE_PATH,
            paths.temp_dir.to_string_lossy(),
            "default temporary file path",
        ),
        ConfigDefault::new(
            keys::MAX_LOG_SIZE,
            "10485760",
            "maximum log file size in bytes (default 10MB)",
        ),
        ConfigDefault::new(
            keys::MAX_LOG_FILES,
            "10",
            "maximum number of log files to keep (default 10)",
        ),
        ConfigDefault::new(keys::LOG_LEVEL, "INFO", "default log level"),
        ConfigDefault::new(
            keys::LOG_PATH,
            paths.logs_dir.to_string_lossy(),
            "default log file path",
        ),
        ConfigDefault::new(
            keys::MAX_DATABASE_LOG_NUM,
            "10000",
            "maximum number of logs to keep in the database (default 10000)",
        ),
        ConfigDefault::new(
            keys::DATABASE_LOG_AUTO_CLEAR,
            "true",
            "whether to automatically clear old logs in the database (default true)",
        ),
        ConfigDefault::new(
            keys::DATABASE_LOG_CLEAR_DAYS,
            "30",
            "number of days to keep logs in the database before clearing (default 30)",
        ),
    ]
}
