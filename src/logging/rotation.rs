//! Size-based log file rotation
//!
//! When the active file grows past its size limit it is renamed to
//! `<base>.<N>.log`, where `N` is one more than the highest index already on
//! disk. Indices come from a directory scan rather than an in-memory counter so
//! numbering stays monotonic across restarts. After each rotation at most one
//! file, the oldest rotated one, is evicted to keep the count at `max_files`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use super::error::LogError;

/// What a rotation did on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    /// New name of the file that used to be active
    pub rotated_to: PathBuf,
    /// Oldest rotated file removed to honour the file cap, if any
    pub evicted: Option<PathBuf>,
}

/// A rotated log file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedFile {
    pub path: PathBuf,
    pub index: u64,
    pub modified: SystemTime,
}

/// Rotate `active` if it is larger than `max_bytes`.
///
/// Returns `Ok(None)` when the file is within limits or does not exist.
pub fn rotate_if_needed(
    active: &Path,
    max_bytes: u64,
    max_files: usize,
) -> Result<Option<RotationOutcome>, LogError> {
    let size = match fs::metadata(active) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LogError::io(active, e)),
    };
    if size <= max_bytes {
        return Ok(None);
    }

    let dir = log_dir(active);
    let base = base_name(active);

    let index = next_rotation_index(&dir, &base)?;
    let rotated_to = dir.join(format!("{base}.{index}.log"));
    fs::rename(active, &rotated_to).map_err(|e| LogError::io(active, e))?;
    debug!(from = %active.display(), to = %rotated_to.display(), size, "log file rotated");

    let mut rotated = rotated_files(&dir, &base)?;
    let evicted = if rotated.len() > max_files {
        let oldest = rotated.remove(0);
        fs::remove_file(&oldest.path).map_err(|e| LogError::io(&oldest.path, e))?;
        debug!(path = %oldest.path.display(), "evicted oldest rotated log");
        Some(oldest.path)
    } else {
        None
    };

    Ok(Some(RotationOutcome {
        rotated_to,
        evicted,
    }))
}

/// Index for the next rotation: one past the highest on disk, or 1
pub fn next_rotation_index(dir: &Path, base: &str) -> Result<u64, LogError> {
    let highest = rotated_files(dir, base)?
        .iter()
        .map(|f| f.index)
        .max()
        .unwrap_or(0);
    Ok(highest + 1)
}

/// List rotated files for `base`, oldest first.
///
/// Ordered by modification time; files modified in the same instant fall back
/// to index order.
pub fn rotated_files(dir: &Path, base: &str) -> Result<Vec<RotatedFile>, LogError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LogError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LogError::io(dir, e))?;
        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(|n| rotation_index(n, base)) else {
            continue;
        };
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| LogError::io(entry.path(), e))?;
        files.push(RotatedFile {
            path: entry.path(),
            index,
            modified,
        });
    }

    files.sort_by(|a, b| a.modified.cmp(&b.modified).then(a.index.cmp(&b.index)));
    Ok(files)
}

/// Parse `<base>.<digits>.log` and return the digits
fn rotation_index(file_name: &str, base: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(base)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Directory holding the active file (`.` for bare file names)
fn log_dir(active: &Path) -> PathBuf {
    match active.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Active file name without its `.log` suffix
fn base_name(active: &Path) -> String {
    let name = active
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(".log") {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}
