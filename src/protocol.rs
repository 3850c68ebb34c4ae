use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    Vote {
        poll_id: PollId,
        candidate_id: CandidateId,
    },
    /// Ask for a fresh copy of the state (e.g. after reconnecting)
    RequestState,
    // Host-only messages
    HostCreatePoll,
    HostDeletePoll {
        poll_id: PollId,
    },
    HostSetActivePoll {
        poll_id: PollId,
    },
    HostUpdateTitle {
        title: String,
    },
    HostSetStatus {
        status: PollStatus,
    },
    /// Full reset of the active poll
    HostResetPoll,
    /// Zero the active poll's counts, keep its candidates
    HostResetVotesOnly,
    HostAddCandidate {
        name: String,
    },
    HostRemoveCandidate {
        candidate_id: CandidateId,
    },
    HostUpdateCandidateName {
        candidate_id: CandidateId,
        name: String,
    },
    HostStartAllVoting,
    HostEndAllVoting,
    HostResetAllVotes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        /// Session token to present on reconnect
        session: SessionToken,
        state: GlobalState,
        /// Polls this session already voted on in their current generation
        voted: Vec<PollId>,
        server_now: String,
    },
    State {
        state: GlobalState,
    },
    PollCreated {
        poll_id: PollId,
    },
    CandidateAdded {
        candidate_id: CandidateId,
    },
    /// Number of polls a bulk operation changed
    BulkApplied {
        changed: usize,
    },
    VoteAck {
        poll_id: PollId,
        candidate_id: CandidateId,
    },
    AlreadyVoted {
        poll_id: PollId,
    },
    Error {
        code: String,
        msg: String,
    },
}
