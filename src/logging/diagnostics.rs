//! Host diagnostics via `tracing`
//!
//! The file logger is the application log of record. Internal diagnostics
//! (database opened, bridge listening, ignored configuration values) go through
//! `tracing` to stderr so they can be raised with `RUST_LOG` during development.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "nimisora=info";

/// Build the filter from `RUST_LOG`, falling back to [`DEFAULT_DIRECTIVE`]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIRECTIVE.into())
}

/// Install the global diagnostics subscriber.
///
/// Fails if a subscriber has already been installed.
pub fn init_diagnostics() -> Result<()> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install diagnostics subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        assert!(DEFAULT_DIRECTIVE.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_diagnostics();
        assert!(init_diagnostics().is_err());
    }
}
