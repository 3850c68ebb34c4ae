//! Projection of the remote `polls` subtree into local state.
//!
//! The tree stores polls as records keyed by id; clients see them as a list
//! ordered by creation.

use crate::backend::{RemoteStore, StoreResult};
use crate::protocol::ServerMessage;
use crate::types::{GlobalState, Poll};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

pub const POLLS_PATH: &str = "polls";

pub fn poll_path(poll_id: &str) -> String {
    format!("{}/{}", POLLS_PATH, poll_id)
}

pub fn candidates_path(poll_id: &str) -> String {
    format!("{}/candidates", poll_path(poll_id))
}

/// Decode the records under `polls` into a creation-ordered list.
/// Records that do not decode are skipped.
pub fn project_polls(records: Option<Value>) -> Vec<Poll> {
    let Some(Value::Object(records)) = records else {
        return Vec::new();
    };

    let mut polls: Vec<Poll> = records
        .into_iter()
        .filter_map(|(key, record)| match serde_json::from_value::<Poll>(record) {
            Ok(poll) => Some(poll),
            Err(e) => {
                tracing::warn!("Skipping malformed poll record '{}': {}", key, e);
                None
            }
        })
        .collect();

    polls.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    polls
}

/// Replace the projected polls with what the tree currently holds and tell
/// connected clients. The active poll pointer is left alone.
pub async fn resync(
    remote: &dyn RemoteStore,
    state: &RwLock<GlobalState>,
    broadcast: &broadcast::Sender<ServerMessage>,
) -> StoreResult<()> {
    // Read under the lock so a slower resync never installs an older tree
    let snapshot = {
        let mut state = state.write().await;
        state.polls = project_polls(remote.get(POLLS_PATH).await?);
        state.clone()
    };

    // Ignore send errors (no receivers connected is fine)
    let _ = broadcast.send(ServerMessage::State { state: snapshot });
    Ok(())
}

/// Spawn a background task that keeps the projection in step with the tree
pub fn spawn_remote_listener(
    remote: Arc<dyn RemoteStore>,
    state: Arc<RwLock<GlobalState>>,
    broadcast: broadcast::Sender<ServerMessage>,
) -> JoinHandle<()> {
    // Subscribe before spawning so nothing written in between is missed
    let mut subscription = remote.subscribe(POLLS_PATH);

    tokio::spawn(async move {
        tracing::info!("Following remote subtree '{}'", subscription.path());

        if let Err(e) = resync(remote.as_ref(), &state, &broadcast).await {
            tracing::error!("Initial poll resync failed: {}", e);
        }

        while subscription.changed().await {
            if let Err(e) = resync(remote.as_ref(), &state, &broadcast).await {
                tracing::error!("Poll resync failed: {}", e);
            }
        }

        tracing::info!("Remote poll listener stopped");
    })
}
