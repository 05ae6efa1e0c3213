//! Filesystem operations requested by the UI process

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::BridgeError;

/// Write `content` to `dir/filename`, creating `dir` if needed.
///
/// `filename` must be a single path component. Returns the written path.
pub fn save_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf, BridgeError> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => {
            return Err(BridgeError::InvalidInput(format!(
                "file name must be a plain name: '{filename}'"
            )))
        }
    }

    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, content)?;
    Ok(path)
}

/// Move `old_path` to `new_path`.
///
/// When the destination does not exist the directory is renamed. When it does,
/// the source tree is copied over it file by file and the source is removed.
/// Returns `true` when a merge happened.
pub fn move_directory(old_path: &Path, new_path: &Path) -> Result<bool, BridgeError> {
    if old_path.as_os_str().is_empty() || new_path.as_os_str().is_empty() {
        return Err(BridgeError::InvalidInput(
            "source and destination paths cannot be empty".to_string(),
        ));
    }
    if !old_path.exists() {
        return Err(BridgeError::InvalidInput(format!(
            "source directory does not exist: {}",
            old_path.display()
        )));
    }
    let source = fs::canonicalize(old_path)?;
    let destination = resolve_existing_prefix(new_path);
    if destination == source {
        return Err(BridgeError::InvalidInput(
            "source and destination paths are the same".to_string(),
        ));
    }
    if destination.starts_with(&source) {
        return Err(BridgeError::InvalidInput(format!(
            "destination {} is inside the source directory",
            new_path.display()
        )));
    }

    if let Some(parent) = new_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if new_path.exists() {
        debug!(from = %old_path.display(), to = %new_path.display(), "merging into existing directory");
        for entry in fs::read_dir(old_path)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &new_path.join(entry.file_name()))?;
        }
        fs::remove_dir_all(old_path)?;
        Ok(true)
    } else {
        fs::rename(old_path, new_path)?;
        Ok(false)
    }
}

/// Canonicalize the longest existing ancestor of `path` and re-append the rest
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(canonical) = fs::canonicalize(current) {
            return missing
                .into_iter()
                .rev()
                .fold(canonical, |acc: PathBuf, name| acc.join(name));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn copy_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    if fs::metadata(src)?.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dest)?;
    }
    Ok(())
}
