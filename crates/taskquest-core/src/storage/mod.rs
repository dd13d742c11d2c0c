//! Per-installation local state: configuration and the weekly marker.

pub mod config;
pub mod marker;

pub use config::Config;
pub use marker::{FileMarkerStore, MemoryMarkerStore, WeekMarkerStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/taskquest[-dev]/` based on TASKQUEST_ENV.
///
/// Set TASKQUEST_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TASKQUEST_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("taskquest-dev")
    } else {
        base_dir.join("taskquest")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
