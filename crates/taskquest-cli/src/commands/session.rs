//! Opens the engine against the local data directory.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use taskquest_core::storage::data_dir;
use taskquest_core::{
    Collaborators, Config, FileMarkerStore, FsObjectStore, SqliteBackend, SyncLayer, SystemClock,
};

const DB_FILE: &str = "taskquest.db";
const OBJECTS_DIR: &str = "objects";

/// Build a sync layer over `<data_dir>/taskquest.db` and load the profile.
pub async fn open() -> Result<SyncLayer, Box<dyn Error>> {
    let dir = data_dir()?;
    let config = Config::load()?;
    let backend = Arc::new(SqliteBackend::open(&dir.join(DB_FILE))?);
    let stores = Collaborators::shared(
        backend,
        Arc::new(FsObjectStore::new(dir.join(OBJECTS_DIR))),
        Arc::new(FileMarkerStore::at(&dir)),
    );
    let user_id = config.profile.user_id.clone();
    let layer = SyncLayer::new(user_id, config, Arc::new(SystemClock), stores);
    layer.load().await?;
    Ok(layer)
}

/// Print queued notifications to stderr so stdout stays machine readable.
pub fn flush_notifications(layer: &SyncLayer) {
    for note in layer.drain_notifications() {
        eprintln!("* {}", note.text());
    }
}

/// Read an image file and return its bytes and lowercase extension.
pub fn read_image(path: &Path) -> Result<(Vec<u8>, String), Box<dyn Error>> {
    let bytes = std::fs::read(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());
    Ok((bytes, ext))
}
