//! CLI subcommands.

pub mod config;
pub mod extract;
mod ledger;
mod output;
pub mod process;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use ticket_core::{ChatCompletionService, TicketConfig, TicketReader};

/// Configuration file in use: `--config` if given, else the per-user default.
pub fn config_path(config: Option<&str>) -> PathBuf {
    match config {
        Some(path) => PathBuf::from(path),
        None => dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ticket")
            .join("config.json"),
    }
}

/// Load the configuration, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> anyhow::Result<TicketConfig> {
    if path.exists() {
        TicketConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))
    } else {
        debug!("No config file at {}, using defaults", path.display());
        Ok(TicketConfig::default())
    }
}

/// Build a reader, wiring in the chat service when its credentials exist.
pub fn build_reader(config: &TicketConfig, fallback: bool) -> TicketReader {
    let reader = TicketReader::new().with_fallback(fallback);
    match ChatCompletionService::from_config(&config.fallback, config.retry.clone()) {
        Ok(service) => reader.with_service(service),
        Err(e) => {
            if fallback {
                warn!("Fallback extraction unavailable: {}", e);
            } else {
                debug!("Fallback extraction not configured: {}", e);
            }
            reader
        }
    }
}
