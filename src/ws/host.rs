//! Host-only command handlers
//!
//! All handlers in this module require the Host role.
//! Authorization is checked in the main dispatch layer before calling these.
//!
//! Successful mutations reply with nothing; the new state reaches every
//! client (host included) through the store's broadcast.

use crate::protocol::ServerMessage;
use crate::state::{PollError, PollResult, PollStore};
use crate::types::PollStatus;
use std::sync::Arc;

fn error_reply(e: PollError) -> ServerMessage {
    match e {
        PollError::Store(ref inner) => tracing::error!("Host command failed: {}", inner),
        ref other => tracing::info!("Host command refused: {}", other),
    }
    ServerMessage::Error {
        code: e.code().to_string(),
        msg: e.to_string(),
    }
}

fn reply(result: PollResult<()>) -> Option<ServerMessage> {
    result.err().map(error_reply)
}

pub async fn handle_create_poll(state: &Arc<PollStore>) -> Option<ServerMessage> {
    match state.create_poll().await {
        Ok(poll_id) => Some(ServerMessage::PollCreated { poll_id }),
        Err(e) => Some(error_reply(e)),
    }
}

pub async fn handle_delete_poll(state: &Arc<PollStore>, poll_id: String) -> Option<ServerMessage> {
    tracing::info!("Host deleting poll {}", poll_id);
    reply(state.delete_poll(&poll_id).await)
}

pub async fn handle_set_active_poll(
    state: &Arc<PollStore>,
    poll_id: String,
) -> Option<ServerMessage> {
    reply(state.set_active_poll(&poll_id).await)
}

pub async fn handle_update_title(state: &Arc<PollStore>, title: String) -> Option<ServerMessage> {
    reply(state.update_title(&title).await)
}

pub async fn handle_set_status(state: &Arc<PollStore>, status: PollStatus) -> Option<ServerMessage> {
    tracing::info!("Host setting active poll status to {:?}", status);
    reply(state.set_status(status).await)
}

pub async fn handle_reset_poll(state: &Arc<PollStore>) -> Option<ServerMessage> {
    tracing::info!("Host resetting active poll");
    reply(state.reset_vote().await)
}

pub async fn handle_reset_votes_only(state: &Arc<PollStore>) -> Option<ServerMessage> {
    tracing::info!("Host resetting votes of active poll");
    reply(state.reset_votes_only().await)
}

pub async fn handle_add_candidate(state: &Arc<PollStore>, name: String) -> Option<ServerMessage> {
    match state.add_candidate(&name).await {
        Ok(candidate_id) => Some(ServerMessage::CandidateAdded { candidate_id }),
        Err(e) => Some(error_reply(e)),
    }
}

pub async fn handle_remove_candidate(
    state: &Arc<PollStore>,
    candidate_id: String,
) -> Option<ServerMessage> {
    reply(state.remove_candidate(&candidate_id).await)
}

pub async fn handle_update_candidate_name(
    state: &Arc<PollStore>,
    candidate_id: String,
    name: String,
) -> Option<ServerMessage> {
    reply(state.update_candidate_name(&candidate_id, &name).await)
}

pub async fn handle_start_all_voting(state: &Arc<PollStore>) -> Option<ServerMessage> {
    tracing::info!("Host starting voting on all polls");
    bulk_reply(state.start_all_voting().await)
}

pub async fn handle_end_all_voting(state: &Arc<PollStore>) -> Option<ServerMessage> {
    tracing::info!("Host ending voting on all polls");
    bulk_reply(state.end_all_voting().await)
}

pub async fn handle_reset_all_votes(state: &Arc<PollStore>) -> Option<ServerMessage> {
    tracing::info!("Host resetting votes on all polls");
    bulk_reply(state.reset_all_votes().await)
}

fn bulk_reply(result: PollResult<usize>) -> Option<ServerMessage> {
    match result {
        Ok(changed) => Some(ServerMessage::BulkApplied { changed }),
        Err(e) => Some(error_reply(e)),
    }
}
