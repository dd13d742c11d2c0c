//! Local weekly cycle marker.
//!
//! Survives restarts on one installation; never shared across devices.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::MarkerError;
use crate::league::WeeklyCycleMarker;

const MARKER_FILE: &str = "league_marker.json";

/// Persistence for the last processed league week.
pub trait WeekMarkerStore: Send + Sync {
    fn load(&self) -> Result<Option<WeeklyCycleMarker>, MarkerError>;
    fn save(&self, marker: &WeeklyCycleMarker) -> Result<(), MarkerError>;
}

/// JSON file in the data directory.
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    path: PathBuf,
}

impl FileMarkerStore {
    /// Marker file inside `dir`.
    pub fn at(dir: &Path) -> Self {
        Self {
            path: dir.join(MARKER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WeekMarkerStore for FileMarkerStore {
    fn load(&self) -> Result<Option<WeeklyCycleMarker>, MarkerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| MarkerError::InvalidFormat {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    fn save(&self, marker: &WeeklyCycleMarker) -> Result<(), MarkerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string(marker).map_err(|e| MarkerError::InvalidFormat {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        // A truncated marker must never be observable.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Process-local marker for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    marker: Mutex<Option<WeeklyCycleMarker>>,
}

impl WeekMarkerStore for MemoryMarkerStore {
    fn load(&self) -> Result<Option<WeeklyCycleMarker>, MarkerError> {
        Ok(*self.marker.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, marker: &WeeklyCycleMarker) -> Result<(), MarkerError> {
        *self.marker.lock().unwrap_or_else(|e| e.into_inner()) = Some(*marker);
        Ok(())
    }
}
