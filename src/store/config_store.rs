//! Key/value application configuration backed by the `app_config` table

use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::database::Database;
use super::error::StoreError;

/// Read-only access to configuration values.
///
/// The logger and the retention sweep consume configuration through this
/// trait so that tests can substitute a failing or fixed source.
pub trait ConfigSource: Send + Sync {
    /// Look up the raw value stored for `key`, `None` when no row exists
    fn config_value(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// A row of the `app_config` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub description: String,
    /// Epoch milliseconds
    pub created_at: i64,
    /// Epoch milliseconds
    pub updated_at: i64,
}

impl ConfigEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
            description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            created_at: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
            updated_at: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
        })
    }
}

/// A value seeded into `app_config` when the key is missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDefault {
    pub key: String,
    pub value: String,
    pub description: String,
}

impl ConfigDefault {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            description: description.into(),
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, key, value, description, created_at, updated_at FROM app_config";

/// Store for application configuration entries
#[derive(Clone)]
pub struct ConfigStore {
    db: Database,
}

impl ConfigStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert each default whose key is not present yet.
    ///
    /// Existing rows are left untouched, so user edits survive restarts.
    /// Returns the number of rows created.
    #[instrument(skip_all, fields(count = defaults.len()))]
    pub fn seed_defaults(&self, defaults: &[ConfigDefault]) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            let mut created = 0;
            for item in defaults {
                created += conn.execute(
                    "INSERT OR IGNORE INTO app_config (key, value, description, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    rusqlite::params![item.key, item.value, item.description, now],
                )?;
            }
            debug!(created, "configuration defaults seeded");
            Ok(created)
        })
    }

    /// Get a single entry by exact key
    pub fn get(&self, key: &str) -> Result<Option<ConfigEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let entry = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE key = ?1 LIMIT 1"),
                    [key],
                    ConfigEntry::from_row,
                )
                .optional()?;
            Ok(entry)
        })
    }

    /// Get the value of a single entry by exact key
    pub fn value(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key)?.map(|entry| entry.value))
    }

    /// List entries, newest first, optionally filtered by a key substring
    pub fn list(&self, key_filter: Option<&str>) -> Result<Vec<ConfigEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let entries = match key_filter {
                Some(filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "{SELECT_COLUMNS} WHERE key LIKE ?1 ORDER BY id DESC"
                    ))?;
                    let rows = stmt.query_map([format!("%{filter}%")], ConfigEntry::from_row)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC"))?;
                    let rows = stmt.query_map([], ConfigEntry::from_row)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(entries)
        })
    }

    /// Count entries, optionally filtered by a key substring
    pub fn count(&self, key_filter: Option<&str>) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = match key_filter {
                Some(filter) => conn.query_row(
                    "SELECT COUNT(*) FROM app_config WHERE key LIKE ?1",
                    [format!("%{filter}%")],
                    |row| row.get(0),
                )?,
                None => conn.query_row("SELECT COUNT(*) FROM app_config", [], |row| row.get(0))?,
            };
            Ok(count as u64)
        })
    }

    /// Update an existing entry.
    ///
    /// Fails with [`StoreError::NotFound`] when the key has never been seeded;
    /// this is never an upsert. A missing description is stored as empty.
    #[instrument(skip(self, value, description))]
    pub fn update(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<ConfigEntry, StoreError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE app_config SET value = ?1, description = ?2, updated_at = ?3 WHERE key = ?4",
                rusqlite::params![value, description.unwrap_or_default(), now, key],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "configuration with key '{key}' does not exist"
                )));
            }
            let entry = conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE key = ?1 LIMIT 1"),
                [key],
                ConfigEntry::from_row,
            )?;
            Ok(entry)
        })
    }
}

impl ConfigSource for ConfigStore {
    fn config_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.value(key)
    }
}
