mod candidate;
pub mod export;
mod poll;
pub mod sync;
pub mod vote;

pub use poll::PollPatch;
pub use vote::VoteResult;

use crate::backend::{Backend, StoreError};
use crate::protocol::ServerMessage;
use crate::session::{MarkerStore, SessionGuard};
use crate::types::*;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Result type for poll store operations
pub type PollResult<T> = Result<T, PollError>;

/// Errors returned by poll store mutators
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("No active poll")]
    NoActivePoll,

    #[error("Cannot delete the last poll")]
    LastPoll,

    #[error("Poll not found: {0}")]
    PollNotFound(PollId),

    #[error("Invalid import: {0}")]
    InvalidImport(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PollError {
    /// Stable error code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            PollError::NoActivePoll => "NO_ACTIVE_POLL",
            PollError::LastPoll => "LAST_POLL",
            PollError::PollNotFound(_) => "POLL_NOT_FOUND",
            PollError::InvalidImport(_) => "INVALID_IMPORT",
            PollError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Poll state shared by every connection.
///
/// With a remote backend `state` is a projection of the tree store; with a
/// local backend it is authoritative and checkpointed after each mutation.
pub struct PollStore {
    pub state: Arc<RwLock<GlobalState>>,
    backend: Backend,
    markers: Arc<dyn MarkerStore>,
    /// Live sessions, held weakly so closed ones drop out
    sessions: RwLock<HashMap<SessionToken, Weak<Mutex<()>>>>,
    /// Broadcast channel for pushing state changes to connected clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PollStore {
    /// Load the initial state from the backend.
    ///
    /// Call [`PollStore::start`] afterwards to follow remote changes.
    pub async fn open(backend: Backend, markers: Arc<dyn MarkerStore>) -> PollResult<Self> {
        let initial = match &backend {
            Backend::Local(snapshots) => export::load_snapshot(snapshots.as_ref()).await?,
            Backend::Remote(remote) => GlobalState {
                polls: sync::project_polls(remote.get(sync::POLLS_PATH).await?),
                active_poll_id: None,
            },
        };

        tracing::info!(
            "Poll store opened ({} backend, {} polls)",
            backend.kind(),
            initial.polls.len()
        );

        let (tx, _rx) = broadcast::channel(100);
        Ok(Self {
            state: Arc::new(RwLock::new(initial)),
            backend,
            markers,
            sessions: RwLock::new(HashMap::new()),
            broadcast: tx,
            listener: Mutex::new(None),
        })
    }

    /// Start following the remote store. No-op for local backends.
    pub async fn start(&self) {
        let Backend::Remote(remote) = &self.backend else {
            return;
        };
        let mut listener = self.listener.lock().await;
        if listener.is_none() {
            *listener = Some(sync::spawn_remote_listener(
                remote.clone(),
                self.state.clone(),
                self.broadcast.clone(),
            ));
        }
    }

    /// Stop the remote listener and write a final local checkpoint
    pub async fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        if let Backend::Local(snapshots) = &self.backend {
            let state = self.snapshot().await;
            if let Err(e) = export::save_snapshot(snapshots.as_ref(), &state).await {
                tracing::error!("Final snapshot failed: {}", e);
            }
        }
        tracing::info!("Poll store shut down");
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub async fn snapshot(&self) -> GlobalState {
        self.state.read().await.clone()
    }

    pub async fn get_poll(&self, poll_id: &str) -> Option<Poll> {
        self.state.read().await.poll(poll_id).cloned()
    }

    pub async fn active_poll(&self) -> Option<Poll> {
        self.state.read().await.active_poll().cloned()
    }

    /// Voting identity for `token`, shared by all of that session's connections
    pub async fn session(&self, token: &str) -> SessionGuard {
        let mut sessions = self.sessions.write().await;
        if let Some(in_flight) = sessions.get(token).and_then(Weak::upgrade) {
            return SessionGuard::with_lock(token, self.markers.clone(), in_flight);
        }

        sessions.retain(|_, in_flight| in_flight.strong_count() > 0);
        let guard = SessionGuard::new(token, self.markers.clone());
        sessions.insert(token.to_string(), guard.downgrade_lock());
        guard
    }

    /// Poll ids this session has already voted on in their current generation
    pub async fn voted_polls(&self, session: &SessionGuard) -> Vec<PollId> {
        let polls = self.snapshot().await.polls;
        let mut voted = Vec::new();
        for poll in polls {
            match session.has_voted_for(&poll.id, &poll.session_id).await {
                Ok(true) => voted.push(poll.id),
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to read vote marker: {}", e),
            }
        }
        voted
    }

    /// Re-read the remote `polls` subtree into the local projection
    pub async fn resync(&self) -> PollResult<()> {
        if let Backend::Remote(remote) = &self.backend {
            sync::resync(remote.as_ref(), &self.state, &self.broadcast).await?;
        }
        Ok(())
    }

    /// Runs after every local state change: notify clients, then checkpoint.
    ///
    /// A failed checkpoint leaves the in-memory change in place; the next
    /// successful one catches up.
    async fn after_mutation(&self, state: GlobalState) -> PollResult<()> {
        let checkpoint = match &self.backend {
            Backend::Local(snapshots) => {
                let result = export::save_snapshot(snapshots.as_ref(), &state).await;
                if let Err(ref e) = result {
                    tracing::error!("Failed to checkpoint poll state: {}", e);
                }
                result
            }
            Backend::Remote(_) => Ok(()),
        };

        // Ignore send errors (no receivers connected is fine)
        let _ = self.broadcast.send(ServerMessage::State { state });
        checkpoint.map_err(PollError::from)
    }
}
