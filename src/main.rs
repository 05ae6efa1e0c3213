use std::sync::Arc;

use anyhow::Result;

use nimisora::bridge::{self, BridgeContext};
use nimisora::config::{self, keys, AppPaths, HostConfig};
use nimisora::logging::{self, LogError, Logger};
use nimisora::store::{ConfigStore, Database, LogStore};

#[tokio::main]
async fn main() -> Result<()> {
    let paths = AppPaths::resolve(config::is_development());
    config::ensure_directories(&paths)?;

    // Diagnostics first so store setup is traced
    logging::init_diagnostics()?;
    tracing::info!("Base directory: {}", paths.base_dir.display());

    let host_config = HostConfig::load(&paths.host_config_path)?;
    if !paths.host_config_path.exists() {
        if let Err(e) = host_config.save(&paths.host_config_path) {
            tracing::warn!("Could not write default host config: {:#}", e);
        }
    }

    let db = Database::open(&paths.database_path)?;
    tracing::info!("Database: {}", db.path().display());
    let config_store = ConfigStore::new(db.clone());
    let log_store = LogStore::new(db);
    let seeded = config_store.seed_defaults(&config::default_config_entries(&paths))?;
    if seeded > 0 {
        tracing::info!("Seeded {} configuration entries", seeded);
    }

    let logger = Arc::new(Logger::new(Some(
        paths.logs_dir.join(logging::default_file_name()),
    )));
    logger.apply_config(Arc::new(config_store.clone())).await;
    tracing::info!("Logging to: {}", logger.active_path().display());

    let report = logging::run_startup_sweep(&log_store, &config_store, &logger);
    if report.total() > 0 {
        tracing::info!("Retention sweep removed {} log rows", report.total());
    }
    note(logger.info("App started"));

    match config_store.value(keys::THEME) {
        Ok(Some(theme)) => note(logger.info(format!("Theme: {theme}"))),
        Ok(None) => {}
        Err(e) => note(logger.warn(format!("Could not read theme: {e}"))),
    }

    let ctx = Arc::new(BridgeContext::new(
        config_store,
        log_store,
        Arc::clone(&logger),
    ));
    let server = if host_config.open_bridge {
        let server = bridge::server::start(host_config.bridge_port, ctx).await?;
        config::write_bridge_token(&paths.bridge_token_path, server.token())?;
        Some(server)
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;

    if let Some(server) = server {
        server.shutdown();
        if let Err(e) = std::fs::remove_file(&paths.bridge_token_path) {
            tracing::debug!("Could not remove bridge token file: {}", e);
        }
    }
    note(logger.info("App stopped"));
    Ok(())
}

/// The file log never stops the host; failures go to diagnostics instead
fn note(result: Result<(), LogError>) {
    if let Err(e) = result {
        tracing::warn!(kind = ?e.kind(), error = %e, "could not write to application log");
    }
}
