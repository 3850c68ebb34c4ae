use super::{sync, PollStore};
use crate::backend::{Backend, RemoteStore, TransactionAction};
use crate::session::SessionGuard;
use crate::types::*;
use serde_json::{json, Value};

/// Result of a vote submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResult {
    /// Counted, and the session is marked for this poll generation
    Recorded,
    /// Session already voted in the poll's current generation; ignored
    AlreadyVoted,
    PollNotFound,
    /// Candidate absent when the increment was applied; nothing committed and
    /// the session stays unmarked
    CandidateNotFound,
    /// Backing store failure; the vote was not counted
    Failed(String),
}

/// Transaction body: bump `votes` of the candidate with `candidate_id`
fn increment_candidate(current: Option<Value>, candidate_id: &str) -> TransactionAction {
    let Some(Value::Array(mut candidates)) = current else {
        return TransactionAction::Abort;
    };
    let Some(candidate) = candidates
        .iter_mut()
        .find(|c| c.get("id").and_then(Value::as_str) == Some(candidate_id))
    else {
        return TransactionAction::Abort;
    };

    let votes = candidate.get("votes").and_then(Value::as_u64).unwrap_or(0);
    candidate["votes"] = json!(votes + 1);
    TransactionAction::Commit(Value::Array(candidates))
}

impl PollStore {
    /// Cast one vote for `candidate_id` on behalf of `session`.
    ///
    /// At most one vote per session per poll generation. Poll status is not
    /// checked here.
    pub async fn cast_vote(
        &self,
        session: &SessionGuard,
        poll_id: &str,
        candidate_id: &str,
    ) -> VoteResult {
        let _in_flight = session.lock().await;

        let result = match &self.backend {
            Backend::Remote(remote) => {
                self.cast_remote(remote.as_ref(), session, poll_id, candidate_id).await
            }
            Backend::Local(_) => self.cast_local(session, poll_id, candidate_id).await,
        };

        tracing::debug!(
            "Vote from {} on {}/{}: {:?}",
            session.token(),
            poll_id,
            candidate_id,
            result
        );
        result
    }

    /// Atomic increment in the tree store; mark only after the commit
    async fn cast_remote(
        &self,
        remote: &dyn RemoteStore,
        session: &SessionGuard,
        poll_id: &str,
        candidate_id: &str,
    ) -> VoteResult {
        let Some(poll) = self.get_poll(poll_id).await else {
            return VoteResult::PollNotFound;
        };
        if let Some(early) = check_not_voted(session, &poll).await {
            return early;
        }

        let target = candidate_id.to_string();
        let outcome = remote
            .transaction(
                &sync::candidates_path(&poll.id),
                Box::new(move |current| increment_candidate(current, &target)),
            )
            .await;

        match outcome {
            Ok(outcome) if outcome.committed => {
                if let Err(e) = session.mark_voted(&poll.id, &poll.session_id).await {
                    tracing::error!(
                        "Vote on {} committed but marker write failed: {}",
                        poll.id,
                        e
                    );
                }
                if let Err(e) = self.resync().await {
                    tracing::warn!("Resync after vote failed: {}", e);
                }
                VoteResult::Recorded
            }
            Ok(_) => {
                tracing::info!(
                    "Candidate {} not found in poll {}, nothing committed",
                    candidate_id,
                    poll.id
                );
                VoteResult::CandidateNotFound
            }
            Err(e) => {
                tracing::error!("Vote failed: {}", e);
                VoteResult::Failed(e.to_string())
            }
        }
    }

    /// Direct increment under the state lock
    async fn cast_local(
        &self,
        session: &SessionGuard,
        poll_id: &str,
        candidate_id: &str,
    ) -> VoteResult {
        let snapshot = {
            let mut state = self.state.write().await;
            let Some(poll) = state.poll_mut(poll_id) else {
                return VoteResult::PollNotFound;
            };
            if let Some(early) = check_not_voted(session, poll).await {
                return early;
            }
            let generation = poll.session_id.clone();
            let Some(candidate) = poll.candidates.iter_mut().find(|c| c.id == candidate_id) else {
                return VoteResult::CandidateNotFound;
            };
            if let Err(e) = session.mark_voted(poll_id, &generation).await {
                tracing::error!("Vote failed: {}", e);
                return VoteResult::Failed(e.to_string());
            }
            candidate.votes += 1;
            state.clone()
        };

        if let Err(e) = self.after_mutation(snapshot).await {
            tracing::warn!("Vote counted but not checkpointed: {}", e);
        }
        VoteResult::Recorded
    }
}

/// `Some(result)` when the vote must not go ahead
async fn check_not_voted(session: &SessionGuard, poll: &Poll) -> Option<VoteResult> {
    match session.has_voted_for(&poll.id, &poll.session_id).await {
        Ok(true) => Some(VoteResult::AlreadyVoted),
        Ok(false) => None,
        Err(e) => {
            tracing::error!("Failed to read vote marker: {}", e);
            Some(VoteResult::Failed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::backend::{
        MemorySnapshotStore, MemoryTreeStore, StoreError, StoreResult, Subscription, TransactionFn,
        TransactionOutcome,
    };
    use crate::session::FileMarkerStore;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Arc;

    async fn both_variants() -> Vec<PollStore> {
        vec![local_store().await, remote_store().await.0]
    }

    #[test]
    fn test_increment_candidate_transaction_body() {
        let current = json!([
            {"id": "a", "name": "A", "votes": 2},
            {"id": "b", "name": "B", "votes": 0}
        ]);

        match increment_candidate(Some(current.clone()), "b") {
            TransactionAction::Commit(v) => {
                assert_eq!(v[0]["votes"], 2);
                assert_eq!(v[1]["votes"], 1);
            }
            TransactionAction::Abort => panic!("Expected commit"),
        }
        assert_eq!(
            increment_candidate(Some(current), "zzz"),
            TransactionAction::Abort
        );
        assert_eq!(increment_candidate(None, "a"), TransactionAction::Abort);
    }

    #[tokio::test]
    async fn test_double_vote_counts_once() {
        for store in both_variants().await {
            let poll = store.active_poll().await.unwrap();
            let target = &poll.candidates[0].id;
            let session = store.session("s1").await;

            assert_eq!(
                store.cast_vote(&session, &poll.id, target).await,
                VoteResult::Recorded
            );
            assert_eq!(
                store.cast_vote(&session, &poll.id, target).await,
                VoteResult::AlreadyVoted
            );

            let poll = store.get_poll(&poll.id).await.unwrap();
            assert_eq!(poll.candidate(target).unwrap().votes, 1);
        }
    }

    #[tokio::test]
    async fn test_failed_marker_write_allows_retry() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let markers = FileMarkerStore::open(data_dir.join("markers.json"))
            .await
            .unwrap();
        let store = PollStore::open(
            Backend::Local(Arc::new(MemorySnapshotStore::new())),
            Arc::new(markers),
        )
        .await
        .unwrap();
        std::fs::write(&data_dir, "in the way").unwrap();

        let poll = store.active_poll().await.unwrap();
        let target = &poll.candidates[0].id;
        let session = store.session("s1").await;

        for _ in 0..2 {
            assert!(matches!(
                store.cast_vote(&session, &poll.id, target).await,
                VoteResult::Failed(_)
            ));
        }
        assert_eq!(store.get_poll(&poll.id).await.unwrap().tally(), 0);
        assert!(store.voted_polls(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_two_sessions_scenario() {
        for store in both_variants().await {
            store.set_status(PollStatus::Voting).await.unwrap();
            let poll = store.active_poll().await.unwrap();
            let (a, b) = (poll.candidates[0].id.clone(), poll.candidates[1].id.clone());
            let s1 = store.session("S1").await;
            let s2 = store.session("S2").await;

            store.cast_vote(&s1, &poll.id, &a).await;
            let now = store.get_poll(&poll.id).await.unwrap();
            assert_eq!(now.candidate(&a).unwrap().votes, 1);
            assert_eq!(now.candidate(&b).unwrap().votes, 0);

            store.cast_vote(&s1, &poll.id, &a).await;
            let now = store.get_poll(&poll.id).await.unwrap();
            assert_eq!(now.candidate(&a).unwrap().votes, 1);

            store.cast_vote(&s2, &poll.id, &a).await;
            let now = store.get_poll(&poll.id).await.unwrap();
            assert_eq!(now.candidate(&a).unwrap().votes, 2);
            assert_eq!(now.candidate(&b).unwrap().votes, 0);
        }
    }

    #[tokio::test]
    async fn test_reset_starts_new_generation() {
        for store in both_variants().await {
            let old = store.active_poll().await.unwrap();
            let session = store.session("s1").await;
            store
                .cast_vote(&session, &old.id, &old.candidates[1].id)
                .await;

            store.reset_votes_only().await.unwrap();
            let new = store.active_poll().await.unwrap();

            assert!(session.has_voted_for(&old.id, &old.session_id).await.unwrap());
            assert!(!session.has_voted_for(&new.id, &new.session_id).await.unwrap());
            assert!(new.candidates.iter().all(|c| c.votes == 0));

            // Same session may vote again in the new generation
            assert_eq!(
                store
                    .cast_vote(&session, &new.id, &new.candidates[1].id)
                    .await,
                VoteResult::Recorded
            );
        }
    }

    #[tokio::test]
    async fn test_full_reset_invalidates_markers() {
        let store = local_store().await;
        let old = store.active_poll().await.unwrap();
        let session = store.session("s1").await;
        store
            .cast_vote(&session, &old.id, &old.candidates[0].id)
            .await;

        store.reset_vote().await.unwrap();
        let new = store.active_poll().await.unwrap();

        assert!(session.has_voted_for(&old.id, &old.session_id).await.unwrap());
        assert!(!session.has_voted_for(&new.id, &new.session_id).await.unwrap());
        assert_eq!(new.tally(), 0);
    }

    #[tokio::test]
    async fn test_vote_on_unknown_poll_is_noop() {
        for store in both_variants().await {
            let before = store.snapshot().await;
            let session = store.session("s1").await;

            assert_eq!(
                store.cast_vote(&session, "missing", "c").await,
                VoteResult::PollNotFound
            );
            assert_eq!(store.snapshot().await, before);
        }
    }

    /// A cast for a candidate that is gone counts nothing and leaves the
    /// session free to vote for something else.
    #[tokio::test]
    async fn test_missing_candidate_does_not_mark_session() {
        for store in both_variants().await {
            let poll = store.active_poll().await.unwrap();
            let session = store.session("s1").await;

            assert_eq!(
                store.cast_vote(&session, &poll.id, "removed-candidate").await,
                VoteResult::CandidateNotFound
            );
            assert!(!session.has_voted_for(&poll.id, &poll.session_id).await.unwrap());
            assert_eq!(store.get_poll(&poll.id).await.unwrap().tally(), 0);

            assert_eq!(
                store
                    .cast_vote(&session, &poll.id, &poll.candidates[0].id)
                    .await,
                VoteResult::Recorded
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_remote_voters_all_counted() {
        let (store, _tree) = remote_store().await;
        let store = Arc::new(store);
        let poll = store.active_poll().await.unwrap();
        let target = poll.candidates[0].id.clone();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                let poll_id = poll.id.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    let session = store.session(&format!("voter-{i}")).await;
                    store.cast_vote(&session, &poll_id, &target).await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), VoteResult::Recorded);
        }

        let poll = store.get_poll(&poll.id).await.unwrap();
        assert_eq!(poll.candidate(&target).unwrap().votes, 20);
    }

    /// Tree store whose transactions always fail
    struct FailingTransactions(MemoryTreeStore);

    #[async_trait]
    impl RemoteStore for FailingTransactions {
        async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
            self.0.get(path).await
        }
        async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
            self.0.set(path, value).await
        }
        async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult<()> {
            self.0.update(path, fields).await
        }
        async fn remove(&self, path: &str) -> StoreResult<()> {
            self.0.remove(path).await
        }
        async fn transaction(
            &self,
            _path: &str,
            _update: TransactionFn,
        ) -> StoreResult<TransactionOutcome> {
            Err(StoreError::Unavailable("connection reset".to_string()))
        }
        fn subscribe(&self, path: &str) -> Subscription {
            self.0.subscribe(path)
        }
    }

    #[tokio::test]
    async fn test_failed_transaction_is_not_marked() {
        let store = remote_store_with(Arc::new(FailingTransactions(MemoryTreeStore::new()))).await;
        store.ensure_poll().await.unwrap();
        let poll = store.active_poll().await.unwrap();
        let session = store.session("s1").await;

        let result = store
            .cast_vote(&session, &poll.id, &poll.candidates[0].id)
            .await;
        assert!(matches!(result, VoteResult::Failed(ref msg) if msg.contains("connection reset")));
        assert!(!session.has_voted_for(&poll.id, &poll.session_id).await.unwrap());
        assert_eq!(store.get_poll(&poll.id).await.unwrap().tally(), 0);
    }
}
