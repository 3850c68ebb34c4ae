use super::{PollPatch, PollResult, PollStore};
use crate::types::*;

impl PollStore {
    /// Append a candidate with zero votes to the active poll
    pub async fn add_candidate(&self, name: &str) -> PollResult<CandidateId> {
        let candidate = Candidate::new(name);
        let candidate_id = candidate.id.clone();

        self.patch_active(move |poll| {
            let mut candidates = poll.candidates.clone();
            candidates.push(candidate);
            Some(PollPatch::candidates(candidates))
        })
        .await?;

        tracing::debug!("Candidate added: {}", candidate_id);
        Ok(candidate_id)
    }

    pub async fn remove_candidate(&self, candidate_id: &str) -> PollResult<()> {
        self.patch_active(|poll| {
            let candidates = poll
                .candidates
                .iter()
                .filter(|c| c.id != candidate_id)
                .cloned()
                .collect();
            Some(PollPatch::candidates(candidates))
        })
        .await
    }

    /// Rename a candidate of the active poll. Unknown ids are ignored.
    pub async fn update_candidate_name(&self, candidate_id: &str, name: &str) -> PollResult<()> {
        self.patch_active(|poll| {
            let index = poll.candidates.iter().position(|c| c.id == candidate_id)?;
            let mut candidates = poll.candidates.clone();
            candidates[index].name = name.to_string();
            Some(PollPatch::candidates(candidates))
        })
        .await
    }
}
