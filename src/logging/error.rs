//! Filesystem errors surfaced by the file logger

use std::path::PathBuf;

/// Categories of disk errors for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// A path component or the whole path exceeds the platform limit
    PathTooLong,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full",
            DiskErrorKind::PermissionDenied => "permission denied",
            DiskErrorKind::PathTooLong => "path too long",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "I/O failure",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        // On some systems, disk full might appear as WriteZero
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28 on Linux and macOS
                    // EDQUOT = 122 on Linux, 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // ENAMETOOLONG = 36 on Linux, 63 on macOS
                    if os_error == 36 || os_error == 63 {
                        return DiskErrorKind::PathTooLong;
                    }
                    // EACCES = 13 on both
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            #[cfg(windows)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ERROR_DISK_FULL = 112, ERROR_HANDLE_DISK_FULL = 39
                    if os_error == 112 || os_error == 39 {
                        return DiskErrorKind::DiskFull;
                    }
                    // ERROR_FILENAME_EXCED_RANGE = 206
                    if os_error == 206 {
                        return DiskErrorKind::PathTooLong;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Errors returned by the file logger
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log file {}: {}", .path.display(), .kind.user_message())]
    Io {
        kind: DiskErrorKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            kind: categorize_io_error(&source),
            path: path.into(),
            source,
        }
    }

    /// The filesystem failure category
    pub fn kind(&self) -> DiskErrorKind {
        match self {
            LogError::Io { kind, .. } => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_categorize_permission_denied() {
        let e = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(categorize_io_error(&e), DiskErrorKind::PermissionDenied);
    }

    #[test]
    fn test_categorize_not_found() {
        let e = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(categorize_io_error(&e), DiskErrorKind::NotFound);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_categorize_raw_os_errors() {
        assert_eq!(
            categorize_io_error(&io::Error::from_raw_os_error(28)),
            DiskErrorKind::DiskFull
        );
        assert_eq!(
            categorize_io_error(&io::Error::from_raw_os_error(36)),
            DiskErrorKind::PathTooLong
        );
    }

    #[test]
    fn test_log_error_display_mentions_path() {
        let err = LogError::io(
            "/var/log/app.log",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.kind(), DiskErrorKind::PermissionDenied);
        let msg = err.to_string();
        assert!(msg.contains("/var/log/app.log"));
        assert!(msg.contains("permission denied"));
    }
}
