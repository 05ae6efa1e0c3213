//! Database log retention
//!
//! Keeps the `app_log` table bounded. The sweep runs once at startup and
//! applies two independent caps: a row-count cap (oldest rows go first) and an
//! age cap. All timestamps are epoch milliseconds.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::keys;
use crate::store::{ConfigSource, LogStore, StoreError};

use super::logger::Logger;

/// Default maximum number of rows kept in `app_log`
pub const DEFAULT_MAX_ROWS: u64 = 10_000;

/// Default retention period in days
pub const DEFAULT_RETENTION_DAYS: u64 = 30;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Retention settings for the database log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_rows: u64,
    pub auto_clear: bool,
    pub clear_days: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            auto_clear: true,
            clear_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl RetentionPolicy {
    /// Read `max_database_log_num`, `database_log_auto_clear` and
    /// `database_log_clear_days`.
    ///
    /// Missing, malformed or zero values keep their defaults. Auto-clear is on only
    /// when the stored value is `true`.
    pub fn load(source: &dyn ConfigSource) -> Result<Self, StoreError> {
        let mut policy = RetentionPolicy::default();

        if let Some(raw) = source.config_value(keys::MAX_DATABASE_LOG_NUM)? {
            match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => policy.max_rows = n,
                _ => debug!(value = %raw, "ignoring configured max_database_log_num"),
            }
        }
        if let Some(raw) = source.config_value(keys::DATABASE_LOG_AUTO_CLEAR)? {
            policy.auto_clear = raw.trim().eq_ignore_ascii_case("true");
        }
        if let Some(raw) = source.config_value(keys::DATABASE_LOG_CLEAR_DAYS)? {
            match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => policy.clear_days = n,
                _ => debug!(value = %raw, "ignoring configured database_log_clear_days"),
            }
        }

        Ok(policy)
    }

    /// Rows with a timestamp strictly below this are expired
    pub fn cutoff(&self, now_ms: i64) -> i64 {
        let span = i64::try_from(self.clear_days)
            .unwrap_or(i64::MAX)
            .saturating_mul(MILLIS_PER_DAY);
        now_ms.saturating_sub(span)
    }
}

/// Rows removed by one sweep, per cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub removed_by_count: u64,
    pub removed_by_age: u64,
}

impl RetentionReport {
    pub fn total(&self) -> u64 {
        self.removed_by_count + self.removed_by_age
    }
}

/// Apply `policy` to the log table as of `now_ms`.
///
/// The count cap runs first, then the age cap; they are not wrapped in a
/// transaction. Running the sweep again without new rows removes nothing.
pub fn sweep(
    store: &LogStore,
    policy: &RetentionPolicy,
    now_ms: i64,
) -> Result<RetentionReport, StoreError> {
    let mut report = RetentionReport::default();
    if !policy.auto_clear {
        return Ok(report);
    }

    let count = store.count()?;
    if count > policy.max_rows {
        report.removed_by_count = store.delete_oldest(count - policy.max_rows)?;
    }

    report.removed_by_age = store.delete_older_than(policy.cutoff(now_ms))?;

    Ok(report)
}

/// Run the startup sweep and record the outcome in the file log.
///
/// Counts go to the file log rather than `app_log` so the sweep never grows
/// the table it just trimmed. Failures are reported at WARN and swallowed.
pub fn run_startup_sweep(
    store: &LogStore,
    source: &dyn ConfigSource,
    logger: &Logger,
) -> RetentionReport {
    let result = RetentionPolicy::load(source)
        .and_then(|policy| sweep(store, &policy, Utc::now().timestamp_millis()));

    match result {
        Ok(report) => {
            if report.removed_by_count > 0 {
                note(logger.info(format!(
                    "Database log exceeded its row cap, removed {} oldest rows",
                    report.removed_by_count
                )));
            }
            if report.removed_by_age > 0 {
                note(logger.info(format!(
                    "Database log exceeded its retention period, removed {} expired rows",
                    report.removed_by_age
                )));
            }
            info!(
                removed_by_count = report.removed_by_count,
                removed_by_age = report.removed_by_age,
                "database log retention sweep finished"
            );
            report
        }
        Err(e) => {
            warn!(error = %e, "database log retention sweep failed");
            note(logger.warn(format!("Database log retention sweep failed: {e}")));
            RetentionReport::default()
        }
    }
}

fn note(result: Result<(), super::LogError>) {
    if let Err(e) = result {
        warn!(error = %e, "could not write to application log");
    }
}
