use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type PollId = String;
pub type CandidateId = String;
/// Poll generation token, regenerated on every reset
pub type PollSessionId = String;
/// Identity of one participant session (browser tab)
pub type SessionToken = String;

pub const DEFAULT_POLL_TITLE: &str = "New Vote";
pub const DEFAULT_CANDIDATES: [&str; 2] = ["Option A", "Option B"];

pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Setup,
    Voting,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    #[serde(default)]
    pub votes: u32,
}

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            votes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub status: PollStatus,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub session_id: PollSessionId,
    /// Creation time in epoch milliseconds, used for stable ordering
    #[serde(default)]
    pub created_at: i64,
}

impl Poll {
    /// A fresh poll with the default title and two empty candidates
    pub fn new_default() -> Self {
        Self {
            id: new_id(),
            title: DEFAULT_POLL_TITLE.to_string(),
            status: PollStatus::Setup,
            candidates: default_candidates(),
            session_id: new_id(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn candidate(&self, candidate_id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == candidate_id)
    }

    /// Candidates with every counter zeroed
    pub fn zeroed_candidates(&self) -> Vec<Candidate> {
        self.candidates
            .iter()
            .map(|c| Candidate {
                votes: 0,
                ..c.clone()
            })
            .collect()
    }

    /// Total votes cast in the current generation
    pub fn tally(&self) -> u32 {
        self.candidates.iter().map(|c| c.votes).sum()
    }
}

pub fn default_candidates() -> Vec<Candidate> {
    DEFAULT_CANDIDATES.iter().map(|name| Candidate::new(*name)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub polls: Vec<Poll>,
    #[serde(default)]
    pub active_poll_id: Option<PollId>,
}

impl GlobalState {
    /// Starting state for a fresh deployment: one default poll, selected
    pub fn with_default_poll() -> Self {
        let poll = Poll::new_default();
        Self {
            active_poll_id: Some(poll.id.clone()),
            polls: vec![poll],
        }
    }

    pub fn poll(&self, poll_id: &str) -> Option<&Poll> {
        self.polls.iter().find(|p| p.id == poll_id)
    }

    pub fn poll_mut(&mut self, poll_id: &str) -> Option<&mut Poll> {
        self.polls.iter_mut().find(|p| p.id == poll_id)
    }

    pub fn active_poll(&self) -> Option<&Poll> {
        self.active_poll_id.as_deref().and_then(|id| self.poll(id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Audience,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_default_poll() {
        let poll = Poll::new_default();
        assert_eq!(poll.title, DEFAULT_POLL_TITLE);
        assert_eq!(poll.status, PollStatus::Setup);
        assert_eq!(poll.candidates.len(), 2);
        assert_ne!(poll.candidates[0].id, poll.candidates[1].id);
        assert_ne!(poll.id, poll.session_id);
        assert_eq!(poll.tally(), 0);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let state = GlobalState::with_default_poll();
        let json = serde_json::to_value(&state).unwrap();

        assert!(json.get("activePollId").is_some());
        let poll = &json["polls"][0];
        assert!(poll.get("sessionId").is_some());
        assert!(poll.get("createdAt").is_some());
        assert_eq!(poll["status"], "setup");
    }

    #[test]
    fn test_poll_without_created_at_deserializes() {
        let json = r#"{
            "id": "p1",
            "title": "Lunch",
            "status": "voting",
            "candidates": [{"id": "c1", "name": "Pizza", "votes": 3}],
            "sessionId": "s1"
        }"#;
        let poll: Poll = serde_json::from_str(json).unwrap();
        assert_eq!(poll.created_at, 0);
        assert_eq!(poll.status, PollStatus::Voting);
        assert_eq!(poll.candidate("c1").map(|c| c.votes), Some(3));
    }

    #[test]
    fn test_zeroed_candidates_keeps_ids_and_names() {
        let mut poll = Poll::new_default();
        poll.candidates[0].votes = 4;
        poll.candidates[1].votes = 2;

        let zeroed = poll.zeroed_candidates();
        assert_eq!(zeroed.len(), 2);
        assert!(zeroed.iter().all(|c| c.votes == 0));
        assert_eq!(zeroed[0].id, poll.candidates[0].id);
        assert_eq!(zeroed[1].name, poll.candidates[1].name);
    }
}
