//! Logging system for NimiSora
//!
//! Provides the leveled file logger with size-based rotation, the startup
//! retention sweep for the database log, and `tracing` diagnostics for the host.

pub mod diagnostics;
mod error;
mod level;
mod logger;
pub mod retention;
pub mod rotation;

pub use diagnostics::init_diagnostics;
pub use error::{categorize_io_error, DiskErrorKind, LogError};
pub use level::{LogEntry, LogLevel, ParseLevelError};
pub use logger::{
    default_file_name, default_log_path, resolve_log_path, Logger, LoggerOverrides,
    RotationState, DEFAULT_MAX_BYTES, DEFAULT_MAX_FILES,
};
pub use retention::{run_startup_sweep, RetentionPolicy, RetentionReport};
