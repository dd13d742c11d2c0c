//! Object Store backed by a local directory.

use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::ObjectStore;
use crate::error::StoreError;

/// Writes objects below `root` and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` below the root, rejecting anything that could escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid object path: {path}"),
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &bytes)?;
        debug!(path, content_type, size = bytes.len(), "stored object");

        let absolute = fs::canonicalize(&target)?;
        Ok(format!("file://{}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());
        let url = store
            .put("task-proofs/u1-t1-x.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.ends_with("task-proofs/u1-t1-x.png"));
        let written = fs::read(temp_dir.path().join("task-proofs/u1-t1-x.png")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());
        for bad in ["../x.png", "/etc/x.png", ""] {
            assert!(store.put(bad, vec![0], "image/png").await.is_err(), "{bad}");
        }
    }
}
