//! WebSocket message dispatch
//!
//! This module provides the main entry point for handling client messages.
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::SessionGuard;
use crate::state::PollStore;
use crate::types::Role;
use std::sync::Arc;

use super::{audience, host};

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($role:expr, $action:expr) => {
        if *$role != Role::Host {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only host can {}", $action),
            });
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    session: &SessionGuard,
    state: &Arc<PollStore>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Vote {
            poll_id,
            candidate_id,
        } => audience::handle_vote(state, session, poll_id, candidate_id).await,

        ClientMessage::RequestState => Some(ServerMessage::State {
            state: state.snapshot().await,
        }),

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::HostCreatePoll => {
            check_host!(role, "create polls");
            host::handle_create_poll(state).await
        }

        ClientMessage::HostDeletePoll { poll_id } => {
            check_host!(role, "delete polls");
            host::handle_delete_poll(state, poll_id).await
        }

        ClientMessage::HostSetActivePoll { poll_id } => {
            check_host!(role, "select polls");
            host::handle_set_active_poll(state, poll_id).await
        }

        ClientMessage::HostUpdateTitle { title } => {
            check_host!(role, "edit titles");
            host::handle_update_title(state, title).await
        }

        ClientMessage::HostSetStatus { status } => {
            check_host!(role, "change poll status");
            host::handle_set_status(state, status).await
        }

        ClientMessage::HostResetPoll => {
            check_host!(role, "reset polls");
            host::handle_reset_poll(state).await
        }

        ClientMessage::HostResetVotesOnly => {
            check_host!(role, "reset votes");
            host::handle_reset_votes_only(state).await
        }

        ClientMessage::HostAddCandidate { name } => {
            check_host!(role, "add candidates");
            host::handle_add_candidate(state, name).await
        }

        ClientMessage::HostRemoveCandidate { candidate_id } => {
            check_host!(role, "remove candidates");
            host::handle_remove_candidate(state, candidate_id).await
        }

        ClientMessage::HostUpdateCandidateName { candidate_id, name } => {
            check_host!(role, "rename candidates");
            host::handle_update_candidate_name(state, candidate_id, name).await
        }

        ClientMessage::HostStartAllVoting => {
            check_host!(role, "start voting");
            host::handle_start_all_voting(state).await
        }

        ClientMessage::HostEndAllVoting => {
            check_host!(role, "end voting");
            host::handle_end_all_voting(state).await
        }

        ClientMessage::HostResetAllVotes => {
            check_host!(role, "reset votes");
            host::handle_reset_all_votes(state).await
        }
    }
}
