//! Environment configuration for the store and the server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{Backend, FileSnapshotStore, MemoryTreeStore, StoreResult};
use crate::session::{FileMarkerStore, MarkerStore, MemoryMarkerStore};

pub const DEFAULT_SNAPSHOT_PATH: &str = "data/polls.json";

pub const DEFAULT_PORT: u16 = 6573;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("LIVEPOLL_BACKEND must be 'local' or 'remote', got '{0}'")]
    UnknownBackend(String),

    #[error("LIVEPOLL_PORT is not a valid port: '{0}'")]
    InvalidPort(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process tree store with transactions
    Remote,
    /// Snapshot file checkpointed after every mutation
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Where poll state and vote markers live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub snapshot_path: PathBuf,
    /// File-backed vote markers when set, in-memory otherwise
    pub marker_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match non_empty_var("LIVEPOLL_BACKEND") {
            Some(v) => v.parse()?,
            None => BackendKind::Local,
        };
        let snapshot_path: PathBuf = non_empty_var("LIVEPOLL_SNAPSHOT_PATH")
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string())
            .into();
        let marker_path = non_empty_var("LIVEPOLL_MARKER_PATH").map(PathBuf::from);

        tracing::info!(
            backend = ?backend,
            snapshot_path = %snapshot_path.display(),
            file_markers = marker_path.is_some(),
            "Store config loaded"
        );

        Ok(Self {
            backend,
            snapshot_path,
            marker_path,
        })
    }

    pub fn build_backend(&self) -> Backend {
        match self.backend {
            BackendKind::Local => {
                Backend::Local(Arc::new(FileSnapshotStore::new(self.snapshot_path.clone())))
            }
            BackendKind::Remote => Backend::Remote(Arc::new(MemoryTreeStore::new())),
        }
    }

    pub async fn build_markers(&self) -> StoreResult<Arc<dyn MarkerStore>> {
        match &self.marker_path {
            Some(path) => Ok(Arc::new(FileMarkerStore::open(path).await?)),
            None => Ok(Arc::new(MemoryMarkerStore::new())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match non_empty_var("LIVEPOLL_PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidPort(v))?,
            None => DEFAULT_PORT,
        };
        Ok(Self { port })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
