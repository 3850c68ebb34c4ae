use super::{sync, PollError, PollResult, PollStore};
use crate::backend::{Backend, StoreError, StoreResult, TransactionAction};
use crate::types::*;
use serde::Serialize;
use serde_json::{Map, Value};

/// Partial update of one poll's fields.
///
/// Every mutation is expressed as a patch so both backends apply it the same
/// way: in place for local state, as a field update for the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PollStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<PollSessionId>,
}

impl PollPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn status(status: PollStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates: Some(candidates),
            ..Default::default()
        }
    }

    /// Back to a fresh default poll, keeping only the id
    pub fn full_reset() -> Self {
        Self {
            title: Some(DEFAULT_POLL_TITLE.to_string()),
            status: Some(PollStatus::Setup),
            candidates: Some(default_candidates()),
            session_id: Some(new_id()),
        }
    }

    /// Zero the counts and start a new voting generation
    pub fn votes_reset(poll: &Poll) -> Self {
        Self {
            title: None,
            status: Some(PollStatus::Setup),
            candidates: Some(poll.zeroed_candidates()),
            session_id: Some(new_id()),
        }
    }

    pub fn apply(self, poll: &mut Poll) {
        if let Some(title) = self.title {
            poll.title = title;
        }
        if let Some(status) = self.status {
            poll.status = status;
        }
        if let Some(candidates) = self.candidates {
            poll.candidates = candidates;
        }
        if let Some(session_id) = self.session_id {
            poll.session_id = session_id;
        }
    }

    /// Field map for a remote partial update
    pub fn into_fields(self) -> StoreResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }
}

impl PollStore {
    /// Create a poll with default title and candidates. Does not select it.
    pub async fn create_poll(&self) -> PollResult<PollId> {
        let poll = Poll::new_default();
        let poll_id = poll.id.clone();

        match &self.backend {
            Backend::Local(_) => {
                let snapshot = {
                    let mut state = self.state.write().await;
                    state.polls.push(poll);
                    state.clone()
                };
                self.after_mutation(snapshot).await?;
            }
            Backend::Remote(remote) => {
                let record = serde_json::to_value(&poll).map_err(StoreError::from)?;
                remote.set(&sync::poll_path(&poll_id), record).await?;
                self.resync().await?;
            }
        }

        tracing::info!("Poll created: {}", poll_id);
        Ok(poll_id)
    }

    /// Make sure at least one poll exists, creating and selecting one if not
    pub async fn ensure_poll(&self) -> PollResult<()> {
        if !self.state.read().await.polls.is_empty() {
            return Ok(());
        }
        let poll_id = self.create_poll().await?;
        self.set_active_poll(&poll_id).await
    }

    /// Delete a poll. The last remaining poll can never be deleted.
    pub async fn delete_poll(&self, poll_id: &str) -> PollResult<()> {
        match &self.backend {
            Backend::Local(_) => {
                let snapshot = {
                    let mut state = self.state.write().await;
                    if state.polls.len() <= 1 {
                        return Err(PollError::LastPoll);
                    }
                    let before = state.polls.len();
                    state.polls.retain(|p| p.id != poll_id);
                    if state.polls.len() == before {
                        return Err(PollError::PollNotFound(poll_id.to_string()));
                    }
                    if state.active_poll_id.as_deref() == Some(poll_id) {
                        state.active_poll_id = None;
                    }
                    state.clone()
                };
                self.after_mutation(snapshot).await?;
            }
            Backend::Remote(remote) => {
                // The last-poll check and the removal commit together
                let target = poll_id.to_string();
                let outcome = remote
                    .transaction(
                        sync::POLLS_PATH,
                        Box::new(move |current| remove_unless_last(current, &target)),
                    )
                    .await?;
                if !outcome.committed {
                    let polls = outcome.snapshot.as_ref().and_then(Value::as_object);
                    if polls.map_or(0, Map::len) <= 1 {
                        return Err(PollError::LastPoll);
                    }
                    return Err(PollError::PollNotFound(poll_id.to_string()));
                }
                {
                    let mut state = self.state.write().await;
                    if state.active_poll_id.as_deref() == Some(poll_id) {
                        state.active_poll_id = None;
                    }
                }
                self.resync().await?;
            }
        }

        tracing::info!("Poll deleted: {}", poll_id);
        Ok(())
    }

    /// Select the poll the host is editing. Only moves the view pointer.
    pub async fn set_active_poll(&self, poll_id: &str) -> PollResult<()> {
        let snapshot = {
            let mut state = self.state.write().await;
            state.active_poll_id = Some(poll_id.to_string());
            state.clone()
        };
        self.after_mutation(snapshot).await
    }

    pub async fn update_title(&self, title: &str) -> PollResult<()> {
        let title = title.to_string();
        self.patch_active(move |_| Some(PollPatch::title(title))).await
    }

    pub async fn set_status(&self, status: PollStatus) -> PollResult<()> {
        self.patch_active(move |_| Some(PollPatch::status(status))).await
    }

    /// Replace title, candidates, status and generation of the active poll
    pub async fn reset_vote(&self) -> PollResult<()> {
        self.patch_active(|_| Some(PollPatch::full_reset())).await
    }

    /// Zero the active poll's counts and start a new voting generation
    pub async fn reset_votes_only(&self) -> PollResult<()> {
        self.patch_active(|poll| Some(PollPatch::votes_reset(poll))).await
    }

    /// Move every poll in setup to voting. Returns how many changed.
    pub async fn start_all_voting(&self) -> PollResult<usize> {
        self.patch_each(|poll| {
            (poll.status == PollStatus::Setup).then(|| PollPatch::status(PollStatus::Voting))
        })
        .await
    }

    /// Move every poll in voting to ended. Returns how many changed.
    pub async fn end_all_voting(&self) -> PollResult<usize> {
        self.patch_each(|poll| {
            (poll.status == PollStatus::Voting).then(|| PollPatch::status(PollStatus::Ended))
        })
        .await
    }

    /// Counts-only reset of every poll, whatever its status
    pub async fn reset_all_votes(&self) -> PollResult<usize> {
        self.patch_each(|poll| Some(PollPatch::votes_reset(poll))).await
    }

    /// Patch the active poll; `build` sees the poll as currently stored
    pub(super) async fn patch_active<F>(&self, build: F) -> PollResult<()>
    where
        F: FnOnce(&Poll) -> Option<PollPatch> + Send,
    {
        let poll_id = self
            .state
            .read()
            .await
            .active_poll()
            .map(|p| p.id.clone())
            .ok_or(PollError::NoActivePoll)?;

        self.patch_poll(&poll_id, build)
            .await
            .map_err(|e| match e {
                // Deleted between lookup and write
                PollError::PollNotFound(_) => PollError::NoActivePoll,
                other => other,
            })
    }

    /// Patch one poll. `build` returning `None` means nothing to write.
    pub(super) async fn patch_poll<F>(&self, poll_id: &str, build: F) -> PollResult<()>
    where
        F: FnOnce(&Poll) -> Option<PollPatch> + Send,
    {
        match &self.backend {
            Backend::Local(_) => {
                let snapshot = {
                    let mut state = self.state.write().await;
                    let poll = state
                        .poll_mut(poll_id)
                        .ok_or_else(|| PollError::PollNotFound(poll_id.to_string()))?;
                    let Some(patch) = build(poll) else {
                        return Ok(());
                    };
                    patch.apply(poll);
                    state.clone()
                };
                self.after_mutation(snapshot).await
            }
            Backend::Remote(remote) => {
                let poll = self
                    .get_poll(poll_id)
                    .await
                    .ok_or_else(|| PollError::PollNotFound(poll_id.to_string()))?;
                let Some(patch) = build(&poll) else {
                    return Ok(());
                };
                remote
                    .update(&sync::poll_path(poll_id), patch.into_fields()?)
                    .await?;
                self.resync().await
            }
        }
    }

    /// Patch every poll `build` returns a patch for
    async fn patch_each<F>(&self, build: F) -> PollResult<usize>
    where
        F: Fn(&Poll) -> Option<PollPatch> + Send,
    {
        let mut changed = 0;

        match &self.backend {
            Backend::Local(_) => {
                let snapshot = {
                    let mut state = self.state.write().await;
                    for poll in state.polls.iter_mut() {
                        if let Some(patch) = build(poll) {
                            patch.apply(poll);
                            changed += 1;
                        }
                    }
                    state.clone()
                };
                if changed > 0 {
                    self.after_mutation(snapshot).await?;
                }
            }
            Backend::Remote(remote) => {
                let polls = self.snapshot().await.polls;
                for poll in &polls {
                    if let Some(patch) = build(poll) {
                        remote
                            .update(&sync::poll_path(&poll.id), patch.into_fields()?)
                            .await?;
                        changed += 1;
                    }
                }
                if changed > 0 {
                    self.resync().await?;
                }
            }
        }

        tracing::info!("Bulk update touched {} polls", changed);
        Ok(changed)
    }
}

/// Transaction body for a remote delete: drop `poll_id` unless it is the last poll
fn remove_unless_last(current: Option<Value>, poll_id: &str) -> TransactionAction {
    let Some(Value::Object(mut polls)) = current else {
        return TransactionAction::Abort;
    };
    if polls.len() <= 1 || polls.remove(poll_id).is_none() {
        return TransactionAction::Abort;
    }
    TransactionAction::Commit(Value::Object(polls))
}
