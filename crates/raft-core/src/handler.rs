//! # handler
//!
//! why: turn raw rpc payloads into protocol decisions without trusting the input
//! relations: called by raft-server's transport, delegates to state.rs
//! what: handle_vote and handle_append, malformed payloads degrade to a negative response

use tracing::warn;

use crate::message::{AppendEntries, AppendEntriesResponse, RequestVote, RequestVoteResponse};
use crate::state::{AppendOutcome, ConsensusState, VoteOutcome};

/// Vote rpc entry point. A payload that does not decode is refused with the
/// current term and never touches state.
pub fn handle_vote(state: &mut ConsensusState, payload: &[u8]) -> VoteOutcome {
    match RequestVote::from_json(payload) {
        Ok(request) => state.decide_vote(&request),
        Err(err) => {
            warn!(node = state.id(), error = %err, "rejecting vote solicitation");
            VoteOutcome {
                response: RequestVoteResponse {
                    term: state.current_term(),
                    vote_granted: false,
                },
                reset_timer: false,
            }
        }
    }
}

/// AppendEntries rpc entry point. A payload that does not decode is refused
/// with the current term and never touches state.
pub fn handle_append(state: &mut ConsensusState, payload: &[u8]) -> AppendOutcome {
    match AppendEntries::from_json(payload) {
        Ok(request) => state.reconcile_and_append(&request),
        Err(err) => {
            warn!(node = state.id(), error = %err, "rejecting AppendEntries");
            AppendOutcome {
                response: AppendEntriesResponse {
                    term: state.current_term(),
                    success: false,
                },
                reset_timer: false,
                reconciled: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogEntry;

    #[test]
    fn undecodable_vote_leaves_state_alone() {
        let mut state = ConsensusState::restore(1, 3, None, vec![LogEntry::new(1, "x")]);
        let outcome = handle_vote(&mut state, b"{\"term\": \"three\"}");
        assert!(!outcome.response.vote_granted);
        assert_eq!(outcome.response.term, 3);
        assert!(!outcome.reset_timer);
        assert_eq!(state.voted_for(), None);
    }

    #[test]
    fn undecodable_append_leaves_state_alone() {
        let mut state = ConsensusState::restore(1, 3, None, vec![LogEntry::new(1, "x")]);
        let outcome = handle_append(&mut state, b"");
        assert!(!outcome.response.success);
        assert_eq!(outcome.response.term, 3);
        assert_eq!(state.log().len(), 1);
    }

    #[test]
    fn decoded_vote_is_delegated() {
        let mut state = ConsensusState::new(1);
        let payload = br#"{"term":5,"candidate_id":7,"last_log_index":0,"last_log_term":0}"#;
        let outcome = handle_vote(&mut state, payload);
        assert!(outcome.response.vote_granted);
        assert_eq!(state.voted_for(), Some(7));
    }
}
