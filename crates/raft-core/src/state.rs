//! # state
//!
//! why: single source of truth for a node's role and raft bookkeeping
//! relations: owns log.rs, driven by handler.rs and by raft-server's timer and applier
//! what: Role enum, ConsensusState, vote decision, log reconciliation and commit, role transition hooks

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::log::{LogEntry, ReplicatedLog};
use crate::message::{AppendEntries, AppendEntriesResponse, NodeId, RequestVote, RequestVoteResponse};

/// The three roles a node can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    /// Passive - listens for heartbeats, votes when asked
    #[default]
    Follower,
    /// Its election timer lapsed without hearing from a leader
    Candidate,
    /// Drives replication for the current term
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        f.write_str(name)
    }
}

/// Result of a vote decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub response: RequestVoteResponse,
    /// A granted vote defers this node's own candidacy
    pub reset_timer: bool,
}

/// How reconciliation changed the log: the first `kept` entries were left alone
/// and `appended` entries were written after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub kept: u64,
    pub appended: u64,
}

impl Reconciled {
    /// True if the log was left exactly as it was before the call
    pub fn is_noop(&self, previous_len: u64) -> bool {
        self.appended == 0 && self.kept == previous_len
    }
}

/// Result of an AppendEntries call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub response: AppendEntriesResponse,
    /// A valid leader message defers this node's own candidacy
    pub reset_timer: bool,
    /// Present only when the call was accepted
    pub reconciled: Option<Reconciled>,
}

/// Persistent and volatile raft state of one node.
///
/// Mutated only through the operations below; callers serialize access.
#[derive(Debug, Clone)]
pub struct ConsensusState {
    id: NodeId,

    // persistent
    current_term: u64,
    voted_for: Option<NodeId>,
    log: ReplicatedLog,

    // volatile
    commit_index: u64,
    last_applied: u64,
    role: Role,
    leader_id: Option<NodeId>,

    // leaders only, reinitialized on election
    next_index: HashMap<NodeId, u64>,
    match_index: HashMap<NodeId, u64>,
}

impl ConsensusState {
    /// Fresh follower at term 0 with an empty log
    pub fn new(id: NodeId) -> Self {
        Self::restore(id, 0, None, Vec::new())
    }

    /// Rebuild a node from its persisted term, vote and log
    pub fn restore(id: NodeId, current_term: u64, voted_for: Option<NodeId>, entries: Vec<LogEntry>) -> Self {
        Self {
            id,
            current_term,
            voted_for,
            log: ReplicatedLog::from_entries(entries),
            commit_index: 0,
            last_applied: 0,
            role: Role::Follower,
            leader_id: None,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn log(&self) -> &ReplicatedLog {
        &self.log
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Last leader heard from in the current term
    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn next_index(&self) -> &HashMap<NodeId, u64> {
        &self.next_index
    }

    pub fn match_index(&self) -> &HashMap<NodeId, u64> {
        &self.match_index
    }

    /// Adopt a strictly higher term, dropping the vote and stepping down.
    ///
    /// Returns true if the term changed.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }
        debug!(node = self.id, from = self.current_term, to = term, "adopting higher term");
        self.current_term = term;
        self.voted_for = None;
        self.leader_id = None;
        self.become_follower();
        true
    }

    fn become_follower(&mut self) {
        if self.role != Role::Follower {
            info!(node = self.id, from = %self.role, term = self.current_term, "stepping down to follower");
        }
        self.role = Role::Follower;
        self.next_index.clear();
        self.match_index.clear();
    }

    /// Decide whether to grant a vote to a candidate
    pub fn decide_vote(&mut self, request: &RequestVote) -> VoteOutcome {
        if request.term < self.current_term {
            warn!(
                node = self.id,
                candidate = request.candidate_id,
                term = request.term,
                current = self.current_term,
                "vote solicitation from stale term"
            );
            return self.vote(false);
        }
        self.observe_term(request.term);

        let available = match self.voted_for {
            None => true,
            Some(candidate) => candidate == request.candidate_id,
        };
        let up_to_date = (request.last_log_term, request.last_log_index)
            >= (self.log.last_term(), self.log.last_index());

        if !(available && up_to_date) {
            debug!(
                node = self.id,
                candidate = request.candidate_id,
                available,
                up_to_date,
                "vote withheld"
            );
            return self.vote(false);
        }

        self.voted_for = Some(request.candidate_id);
        info!(node = self.id, candidate = request.candidate_id, term = self.current_term, "vote granted");
        self.vote(true)
    }

    fn vote(&self, granted: bool) -> VoteOutcome {
        VoteOutcome {
            response: RequestVoteResponse {
                term: self.current_term,
                vote_granted: granted,
            },
            reset_timer: granted,
        }
    }

    /// Validate an AppendEntries against the local log, reconcile any
    /// conflicting suffix and advance the commit index.
    pub fn reconcile_and_append(&mut self, request: &AppendEntries) -> AppendOutcome {
        match self.role {
            Role::Leader => {
                warn!(node = self.id, from = request.leader_id, term = request.term, "leaders cannot take AppendEntries");
                // a higher term still demotes us, but this message is not applied
                self.observe_term(request.term);
                return self.append_rejected();
            }
            Role::Candidate | Role::Follower => {}
        }

        if request.term < self.current_term {
            warn!(
                node = self.id,
                leader = request.leader_id,
                term = request.term,
                current = self.current_term,
                "AppendEntries from stale term"
            );
            return self.append_rejected();
        }
        self.observe_term(request.term);
        // a legitimate leader exists for this term
        self.become_follower();
        self.leader_id = Some(request.leader_id);

        if request.prev_log_index > 0 {
            match self.log.at(request.prev_log_index) {
                None => {
                    debug!(
                        node = self.id,
                        prev_log_index = request.prev_log_index,
                        len = self.log.len(),
                        "log too short to reconcile"
                    );
                    return self.append_rejected();
                }
                Some(entry) if entry.term != request.prev_log_term => {
                    debug!(
                        node = self.id,
                        prev_log_index = request.prev_log_index,
                        expected = request.prev_log_term,
                        found = entry.term,
                        "term mismatch at reconciliation point"
                    );
                    return self.append_rejected();
                }
                Some(_) => {}
            }
        }

        if request.is_heartbeat() {
            debug!(node = self.id, leader = request.leader_id, term = self.current_term, "heartbeat");
        } else {
            debug!(
                node = self.id,
                leader = request.leader_id,
                prev_log_index = request.prev_log_index,
                count = request.entries.len(),
                "reconciling entries"
            );
        }
        let reconciled = self.reconcile(request.prev_log_index, &request.entries);
        self.advance_commit_index(request.leader_commit);

        AppendOutcome {
            response: AppendEntriesResponse {
                term: self.current_term,
                success: true,
            },
            reset_timer: true,
            reconciled: Some(reconciled),
        }
    }

    fn append_rejected(&self) -> AppendOutcome {
        AppendOutcome {
            response: AppendEntriesResponse {
                term: self.current_term,
                success: false,
            },
            reset_timer: false,
            reconciled: None,
        }
    }

    /// Drop the first conflicting suffix and append whatever the leader sent past it
    fn reconcile(&mut self, prev_log_index: u64, entries: &[LogEntry]) -> Reconciled {
        let mut kept = self.log.len();
        let mut first_new = entries.len();

        for (offset, incoming) in entries.iter().enumerate() {
            let index = prev_log_index + 1 + offset as u64;
            match self.log.at(index) {
                Some(existing) if existing.term == incoming.term => continue,
                Some(_) | None => {
                    kept = index - 1;
                    first_new = offset;
                    break;
                }
            }
        }

        if kept < self.log.len() {
            debug!(node = self.id, from = kept + 1, len = self.log.len(), "truncating conflicting suffix");
        }
        self.log.truncate_to(kept);
        let fresh = &entries[first_new..];
        self.log.append(fresh.iter().cloned());

        Reconciled {
            kept,
            appended: fresh.len() as u64,
        }
    }

    fn advance_commit_index(&mut self, leader_commit: u64) {
        let target = leader_commit.min(self.log.len());
        if target > self.commit_index {
            debug!(node = self.id, from = self.commit_index, to = target, "commit index advanced");
            self.commit_index = target;
        }
    }

    /// Election timer expiry hook.
    ///
    /// Returns true if a candidacy should be started (or restarted).
    pub fn election_timed_out(&mut self) -> bool {
        match self.role {
            Role::Follower => {
                info!(node = self.id, term = self.current_term, "election timeout, becoming candidate");
                self.role = Role::Candidate;
                self.leader_id = None;
                true
            }
            Role::Candidate => {
                info!(node = self.id, term = self.current_term, "election lapsed without a winner");
                true
            }
            Role::Leader => false,
        }
    }

    /// Take over as leader, initializing per-peer replication tracking.
    ///
    /// Only a candidate can become leader; returns false otherwise.
    pub fn become_leader(&mut self, peers: &[NodeId]) -> bool {
        match self.role {
            Role::Candidate => {}
            Role::Follower | Role::Leader => return false,
        }
        let next = self.log.last_index() + 1;
        self.next_index = peers
            .iter()
            .filter(|&&peer| peer != self.id)
            .map(|&peer| (peer, next))
            .collect();
        self.match_index = self.next_index.keys().map(|&peer| (peer, 0)).collect();
        self.role = Role::Leader;
        self.leader_id = Some(self.id);
        info!(node = self.id, term = self.current_term, "became leader");
        true
    }

    /// Advance last_applied up to commit_index, returning each newly applied entry
    pub fn drain_committed(&mut self) -> Vec<(u64, LogEntry)> {
        let mut applied = Vec::new();
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            let Some(entry) = self.log.at(index) else {
                break;
            };
            applied.push((index, entry.clone()));
            self.last_applied = index;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(term: u64, prev_log_index: u64, prev_log_term: u64, entries: Vec<LogEntry>, leader_commit: u64) -> AppendEntries {
        AppendEntries {
            term,
            leader_id: 2,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit,
        }
    }

    #[test]
    fn new_state_starts_as_follower() {
        let state = ConsensusState::new(1);
        assert_eq!(state.role(), Role::Follower);
        assert_eq!(state.current_term(), 0);
        assert_eq!(state.voted_for(), None);
        assert!(state.log().is_empty());
        assert_eq!(state.commit_index(), 0);
        assert_eq!(state.last_applied(), 0);
    }

    #[test]
    fn observe_term_ignores_equal_and_lower() {
        let mut state = ConsensusState::restore(1, 4, Some(3), Vec::new());
        assert!(!state.observe_term(4));
        assert!(!state.observe_term(2));
        assert_eq!(state.voted_for(), Some(3));
        assert!(state.observe_term(5));
        assert_eq!(state.voted_for(), None);
    }

    #[test]
    fn reconcile_keeps_matching_overlap() {
        let mut state = ConsensusState::new(1);
        state.reconcile_and_append(&append(1, 0, 0, vec![LogEntry::new(1, "a"), LogEntry::new(1, "b")], 0));

        // leader resends the first entry only; the tail must survive
        let outcome = state.reconcile_and_append(&append(1, 0, 0, vec![LogEntry::new(1, "a")], 0));
        assert!(outcome.response.success);
        assert_eq!(outcome.reconciled, Some(Reconciled { kept: 2, appended: 0 }));
        assert_eq!(state.log().len(), 2);
    }

    #[test]
    fn drain_never_passes_commit_index() {
        let mut state = ConsensusState::new(1);
        state.reconcile_and_append(&append(1, 0, 0, vec![LogEntry::new(1, "a"), LogEntry::new(1, "b")], 1));
        let applied = state.drain_committed();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0, 1);
        assert_eq!(state.last_applied(), 1);
        assert!(state.drain_committed().is_empty());
    }

    #[test]
    fn role_display_is_lowercase() {
        assert_eq!(Role::Candidate.to_string(), "candidate");
    }
}
