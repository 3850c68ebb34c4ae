//! Backing stores the poll store synchronizes with.
//!
//! Two shapes are supported:
//! - a path-addressable tree store with transactions and change
//!   subscriptions ([`RemoteStore`])
//! - a single durable blob for local snapshots ([`SnapshotStore`])

mod local;
mod remote;

use std::sync::Arc;

pub use local::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use remote::{
    MemoryTreeStore, RemoteStore, Subscription, TransactionAction, TransactionFn,
    TransactionOutcome, MAX_TRANSACTION_ATTEMPTS,
};

/// Result type for backing store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by backing stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transaction on '{path}' gave up after {attempts} attempts")]
    Contention { path: String, attempts: usize },

    /// Raised by network-backed implementations
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),
}

/// Where the authoritative poll data lives
#[derive(Clone)]
pub enum Backend {
    /// Remote tree store is authoritative; local state is a projection
    Remote(Arc<dyn RemoteStore>),
    /// Local state is authoritative and checkpointed to a snapshot
    Local(Arc<dyn SnapshotStore>),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Remote(_) => "remote",
            Backend::Local(_) => "local",
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Backend::{}", self.kind())
    }
}
