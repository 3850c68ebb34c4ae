//! Audience message handlers

use crate::protocol::ServerMessage;
use crate::session::SessionGuard;
use crate::state::{PollStore, VoteResult};
use crate::types::PollStatus;
use std::sync::Arc;

pub async fn handle_vote(
    state: &Arc<PollStore>,
    session: &SessionGuard,
    poll_id: String,
    candidate_id: String,
) -> Option<ServerMessage> {
    tracing::info!("Vote: poll={}, candidate={}", poll_id, candidate_id);

    // The store counts whatever it is given; only open polls take votes here
    match state.get_poll(&poll_id).await {
        Some(poll) if poll.status == PollStatus::Voting => {}
        Some(_) => {
            return Some(ServerMessage::Error {
                code: "VOTING_CLOSED".to_string(),
                msg: "Voting is not open for this poll".to_string(),
            });
        }
        None => {
            return Some(ServerMessage::Error {
                code: "POLL_NOT_FOUND".to_string(),
                msg: "Poll not found".to_string(),
            });
        }
    }

    match state.cast_vote(session, &poll_id, &candidate_id).await {
        VoteResult::Recorded => Some(ServerMessage::VoteAck {
            poll_id,
            candidate_id,
        }),
        VoteResult::AlreadyVoted => {
            tracing::debug!("Session {} already voted on {}", session.token(), poll_id);
            Some(ServerMessage::AlreadyVoted { poll_id })
        }
        VoteResult::PollNotFound => Some(ServerMessage::Error {
            code: "POLL_NOT_FOUND".to_string(),
            msg: "Poll not found".to_string(),
        }),
        VoteResult::CandidateNotFound => Some(ServerMessage::Error {
            code: "CANDIDATE_NOT_FOUND".to_string(),
            msg: "Candidate not found".to_string(),
        }),
        VoteResult::Failed(_) => Some(ServerMessage::Error {
            code: "VOTE_FAILED".to_string(),
            msg: "Your vote could not be recorded, please try again".to_string(),
        }),
    }
}
