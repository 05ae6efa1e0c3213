//! Persisted log rows in the `app_log` table
//!
//! Rows are insert-only. Deletion happens exclusively through the retention
//! helpers at the bottom of this file, driven by the startup sweep.

use chrono::Utc;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::database::Database;
use super::error::StoreError;

/// A row of the `app_log` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub id: i64,
    pub level: String,
    pub event: String,
    pub message: String,
    pub context: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Processing time in milliseconds, when the writer measured one
    pub cost_time: Option<f64>,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            level: row.get(1)?,
            event: row.get(2)?,
            message: row.get(3)?,
            context: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            timestamp: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
            cost_time: row.get(6)?,
        })
    }
}

/// Values for a new log row; the id and timestamp are assigned on insert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLogRow {
    pub level: String,
    pub event: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub cost_time: Option<f64>,
}

/// Filters for [`LogStore::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Exact level match
    #[serde(default)]
    pub level: Option<String>,
    /// Substring match on the event name
    #[serde(default)]
    pub event: Option<String>,
    /// Inclusive lower bound, epoch milliseconds
    #[serde(default)]
    pub start_time: Option<i64>,
    /// Inclusive upper bound, epoch milliseconds
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    /// Page size; `-1` means unbounded
    #[serde(default)]
    pub limit: Option<i64>,
}

const SELECT_COLUMNS: &str =
    "SELECT id, level, event, message, context, timestamp, cost_time FROM app_log";

/// Store for persisted log rows
#[derive(Clone)]
pub struct LogStore {
    db: Database,
}

impl LogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a row stamped with the current time, returning its id
    pub fn insert(&self, row: &NewLogRow) -> Result<i64, StoreError> {
        self.insert_at(row, Utc::now().timestamp_millis())
    }

    /// Insert a row with an explicit epoch-millisecond timestamp
    pub fn insert_at(&self, row: &NewLogRow, timestamp: i64) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO app_log (level, event, message, context, timestamp, cost_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.level,
                    row.event,
                    row.message,
                    row.context.as_deref().unwrap_or_default(),
                    timestamp,
                    row.cost_time,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Query rows, newest first
    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRow>, StoreError> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(level) = &q.level {
            sql.push_str(&format!(" AND level = ?{}", params.len() + 1));
            params.push(Box::new(level.clone()));
        }
        if let Some(event) = &q.event {
            sql.push_str(&format!(" AND event LIKE ?{}", params.len() + 1));
            params.push(Box::new(format!("%{event}%")));
        }
        if let Some(start) = q.start_time {
            sql.push_str(&format!(" AND timestamp >= ?{}", params.len() + 1));
            params.push(Box::new(start));
        }
        if let Some(end) = q.end_time {
            sql.push_str(&format!(" AND timestamp <= ?{}", params.len() + 1));
            params.push(Box::new(end));
        }

        sql.push_str(" ORDER BY timestamp DESC, id DESC");

        match q.limit {
            Some(limit) if limit >= 0 => {
                sql.push_str(&format!(
                    " LIMIT ?{} OFFSET ?{}",
                    params.len() + 1,
                    params.len() + 2
                ));
                params.push(Box::new(limit));
                params.push(Box::new(q.offset.unwrap_or(0).max(0)));
            }
            _ => {}
        }

        self.db.with_conn(|conn| {
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs.as_slice(), LogRow::from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Total number of rows
    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM app_log", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Delete the `n` oldest rows by timestamp (ties broken by id).
    ///
    /// Returns the number of rows removed.
    pub fn delete_oldest(&self, n: u64) -> Result<u64, StoreError> {
        if n == 0 {
            return Ok(0);
        }
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM app_log WHERE id IN
                 (SELECT id FROM app_log ORDER BY timestamp ASC, id ASC LIMIT ?1)",
                [n as i64],
            )?;
            Ok(removed as u64)
        })
    }

    /// Delete every row strictly older than `cutoff` (epoch milliseconds).
    ///
    /// Returns the number of rows removed.
    pub fn delete_older_than(&self, cutoff: i64) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM app_log WHERE timestamp < ?1", [cutoff])?;
            Ok(removed as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> LogStore {
        LogStore::new(Database::in_memory().unwrap())
    }

    fn row(level: &str, event: &str) -> NewLogRow {
        NewLogRow {
            level: level.to_string(),
            event: event.to_string(),
            message: format!("{event} happened"),
            context: None,
            cost_time: None,
        }
    }

    #[test]
    fn test_insert_and_count() {
        let store = test_store();
        let id = store.insert(&row("INFO", "startup")).unwrap();
        assert!(id > 0);
        assert_eq!(store.count().unwrap(), 1);

        let rows = store.query(&LogQuery::default()).unwrap();
        assert_eq!(rows[0].event, "startup");
        assert_eq!(rows[0].context, "");
        assert_eq!(rows[0].cost_time, None);
    }

    #[test]
    fn test_insert_keeps_cost_time() {
        let store = test_store();
        let mut new_row = row("DEBUG", "render");
        new_row.cost_time = Some(12.5);
        new_row.context = Some("page=settings".to_string());
        store.insert(&new_row).unwrap();

        let rows = store.query(&LogQuery::default()).unwrap();
        assert_eq!(rows[0].cost_time, Some(12.5));
        assert_eq!(rows[0].context, "page=settings");
    }

    #[test]
    fn test_query_filters() {
        let store = test_store();
        store.insert_at(&row("INFO", "file.save"), 1_000).unwrap();
        store.insert_at(&row("ERROR", "file.move"), 2_000).unwrap();
        store.insert_at(&row("INFO", "config.update"), 3_000).unwrap();

        let info = store
            .query(&LogQuery {
                level: Some("INFO".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(info.len(), 2);
        // Newest first
        assert_eq!(info[0].event, "config.update");

        let file_events = store
            .query(&LogQuery {
                event: Some("file".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(file_events.len(), 2);

        let ranged = store
            .query(&LogQuery {
                start_time: Some(1_500),
                end_time: Some(3_000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ranged.len(), 2);
        assert_eq!(ranged[1].event, "file.move");
    }

    #[test]
    fn test_query_paging() {
        let store = test_store();
        for i in 0..5 {
            store.insert_at(&row("INFO", &format!("e{i}")), i).unwrap();
        }

        let page = store
            .query(&LogQuery {
                offset: Some(1),
                limit: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].event, "e3");
        assert_eq!(page[1].event, "e2");

        let unbounded = store
            .query(&LogQuery {
                offset: Some(1),
                limit: Some(-1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(unbounded.len(), 5);
    }

    #[test]
    fn test_delete_oldest() {
        let store = test_store();
        for i in 0..5 {
            store.insert_at(&row("INFO", &format!("e{i}")), 100 - i).unwrap();
        }

        assert_eq!(store.delete_oldest(2).unwrap(), 2);
        let remaining: Vec<String> = store
            .query(&LogQuery::default())
            .unwrap()
            .into_iter()
            .map(|r| r.event)
            .collect();
        // e4 and e3 carried the smallest timestamps
        assert_eq!(remaining, vec!["e0", "e1", "e2"]);
        assert_eq!(store.delete_oldest(0).unwrap(), 0);
    }

    #[test]
    fn test_delete_older_than_is_strict() {
        let store = test_store();
        store.insert_at(&row("INFO", "old"), 999).unwrap();
        store.insert_at(&row("INFO", "edge"), 1_000).unwrap();
        store.insert_at(&row("INFO", "new"), 1_001).unwrap();

        assert_eq!(store.delete_older_than(1_000).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 2);
    }
}
