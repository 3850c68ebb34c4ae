use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::StoreResult;

/// Durable storage for a single serialized blob
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet
    async fn load(&self) -> StoreResult<Option<String>>;

    async fn save(&self, blob: &str) -> StoreResult<()>;
}

/// Snapshot kept in a JSON file on disk
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> StoreResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, blob: &str) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write next to the target and rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Snapshot kept in memory, for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blob: RwLock<Option<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: RwLock::new(Some(blob.into())),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> StoreResult<Option<String>> {
        Ok(self.blob.read().await.clone())
    }

    async fn save(&self, blob: &str) -> StoreResult<()> {
        *self.blob.write().await = Some(blob.to_string());
        Ok(())
    }
}
