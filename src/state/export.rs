//! Snapshots of the poll state.
//!
//! The same JSON shape serves two purposes:
//! - the local checkpoint written after every mutation
//! - export/import for backup and restoration during live events

use super::{sync, PollError, PollResult, PollStore};
use crate::backend::{Backend, SnapshotStore, StoreError, StoreResult};
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable export of the whole poll state.
///
/// Vote markers are not included; they belong to the sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub state: GlobalState,
}

impl StateExport {
    pub fn new(state: GlobalState) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            state,
        }
    }

    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        if self.state.polls.is_empty() {
            return Err("Export must contain at least one poll".to_string());
        }

        let poll_ids = unique_ids(&self.state.polls)?;

        if let Some(ref active) = self.state.active_poll_id {
            if !poll_ids.contains(active.as_str()) {
                return Err(format!(
                    "activePollId '{}' does not match any poll in the export",
                    active
                ));
            }
        }

        Ok(())
    }
}

/// Ids of `polls`, failing on a duplicate poll id or a duplicate candidate id
/// within one poll
fn unique_ids(polls: &[Poll]) -> Result<HashSet<&str>, String> {
    let mut poll_ids = HashSet::new();
    for poll in polls {
        if !poll_ids.insert(poll.id.as_str()) {
            return Err(format!("Duplicate poll id '{}'", poll.id));
        }
        let mut candidate_ids = HashSet::new();
        for candidate in &poll.candidates {
            if !candidate_ids.insert(candidate.id.as_str()) {
                return Err(format!(
                    "Poll '{}' has duplicate candidate id '{}'",
                    poll.id, candidate.id
                ));
            }
        }
    }
    Ok(poll_ids)
}

/// Decode a stored checkpoint, merging it over the empty default state.
///
/// Passes only if the blob is a JSON object with a `polls` list whose poll
/// and candidate ids are unique.
pub fn parse_snapshot(blob: &str) -> Result<GlobalState, String> {
    let loaded: Value =
        serde_json::from_str(blob).map_err(|e| format!("not valid JSON: {}", e))?;
    let Value::Object(loaded) = loaded else {
        return Err("snapshot is not a JSON object".to_string());
    };
    if !loaded.get("polls").is_some_and(Value::is_array) {
        return Err("snapshot has no polls list".to_string());
    }

    let mut merged = match serde_json::to_value(GlobalState::default()) {
        Ok(Value::Object(defaults)) => defaults,
        _ => Map::new(),
    };
    merged.extend(loaded);

    let state: GlobalState = serde_json::from_value(Value::Object(merged))
        .map_err(|e| format!("does not decode: {}", e))?;
    unique_ids(&state.polls)?;
    Ok(state)
}

/// Load the local checkpoint, falling back to a fresh default state when it
/// is missing or malformed
pub async fn load_snapshot(store: &dyn SnapshotStore) -> StoreResult<GlobalState> {
    let Some(blob) = store.load().await? else {
        tracing::info!("No saved poll state, starting with a default poll");
        return Ok(GlobalState::with_default_poll());
    };

    match parse_snapshot(&blob) {
        Ok(state) => {
            tracing::info!("Restored {} polls from snapshot", state.polls.len());
            Ok(state)
        }
        Err(reason) => {
            tracing::warn!(
                "Ignoring saved poll state ({}), starting with defaults",
                reason
            );
            Ok(GlobalState::with_default_poll())
        }
    }
}

pub async fn save_snapshot(store: &dyn SnapshotStore, state: &GlobalState) -> StoreResult<()> {
    let blob = serde_json::to_string(state)?;
    store.save(&blob).await
}

impl PollStore {
    pub async fn export_state(&self) -> StateExport {
        StateExport::new(self.snapshot().await)
    }

    /// Replace all polls and the selection with an export
    pub async fn import_state(&self, export: StateExport) -> PollResult<()> {
        export.validate().map_err(PollError::InvalidImport)?;
        let imported = export.state;
        let count = imported.polls.len();

        match &self.backend {
            Backend::Local(_) => {
                let snapshot = {
                    let mut state = self.state.write().await;
                    *state = imported;
                    state.clone()
                };
                self.after_mutation(snapshot).await?;
            }
            Backend::Remote(remote) => {
                let mut records = Map::new();
                for poll in &imported.polls {
                    let record = serde_json::to_value(poll).map_err(StoreError::from)?;
                    records.insert(poll.id.clone(), record);
                }
                remote
                    .set(sync::POLLS_PATH, Value::Object(records))
                    .await?;
                self.state.write().await.active_poll_id = imported.active_poll_id;
                self.resync().await?;
            }
        }

        tracing::info!("Imported {} polls", count);
        Ok(())
    }
}
