//! # node
//!
//! why: run one consensus state safely under concurrent rpcs, timer expiry and the applier
//! relations: owns raft-core's ConsensusState and a raft-storage backend, drives timer.rs and applier.rs
//! what: Node handle with rpc entry points, persistence of every change, status snapshot, shutdown

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use raft_core::{
    handle_append, handle_vote, AppendEntriesResponse, ConsensusState, NodeId, RaftConfig,
    Reconciled, RequestVoteResponse, Role,
};
use raft_storage::Storage;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::applier::{LogApplier, StateMachine};
use crate::error::Result;
use crate::timer::ElectionTimer;

/// Point-in-time view of a node, served on the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub role: Role,
    pub term: u64,
    pub voted_for: Option<NodeId>,
    pub commit_index: u64,
    pub last_applied: u64,
    pub log_length: u64,
    pub leader_id: Option<NodeId>,
}

/// Everything guarded by the node's single lock
struct Core {
    state: ConsensusState,
    storage: Box<dyn Storage>,
    roles: watch::Sender<Role>,
    /// a failed write may have left storage partially updated
    out_of_sync: bool,
}

type SharedCore = Arc<Mutex<Core>>;

fn lock(core: &SharedCore) -> MutexGuard<'_, Core> {
    // every mutation leaves the state consistent before anything can panic
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Core {
    /// Rewrite the whole (term, vote, log) triple from memory
    fn rewrite_storage(&mut self) -> Result<()> {
        self.storage
            .save_term_and_vote(self.state.current_term(), self.state.voted_for())?;
        self.storage.truncate_log_to(0)?;
        self.storage.append_entries(self.state.log().entries())?;
        self.out_of_sync = false;
        info!(node = self.state.id(), "storage resynchronized");
        Ok(())
    }

    /// Run `write`, or a full rewrite while storage is out of sync. On failure
    /// the state goes back to `saved` so memory never runs ahead of disk.
    fn commit(&mut self, saved: ConsensusState, write: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let written = if self.out_of_sync {
            self.rewrite_storage()
        } else {
            write(self)
        };
        if written.is_err() {
            self.state = saved;
            self.out_of_sync = true;
        }
        written
    }

    fn persist_term_and_vote(&mut self, before: (u64, Option<NodeId>)) -> Result<()> {
        let now = (self.state.current_term(), self.state.voted_for());
        if now != before {
            self.storage.save_term_and_vote(now.0, now.1)?;
        }
        Ok(())
    }

    fn persist_log(&mut self, previous_len: u64, reconciled: Reconciled) -> Result<()> {
        if reconciled.is_noop(previous_len) {
            return Ok(());
        }
        if reconciled.kept < previous_len {
            self.storage.truncate_log_to(reconciled.kept)?;
        }
        self.storage
            .append_entries(self.state.log().entries_after(reconciled.kept))?;
        Ok(())
    }

    fn persist_append(
        &mut self,
        before: (u64, Option<NodeId>),
        previous_len: u64,
        reconciled: Option<Reconciled>,
    ) -> Result<()> {
        self.persist_term_and_vote(before)?;
        match reconciled {
            Some(reconciled) => self.persist_log(previous_len, reconciled),
            None => Ok(()),
        }
    }

    /// Notify watchers of every expiry, even when the role stays Candidate
    fn announce_timeout(&self) {
        self.roles.send_replace(self.state.role());
    }

    fn publish_role(&self) {
        let role = self.state.role();
        self.roles.send_if_modified(|current| {
            if *current == role {
                return false;
            }
            *current = role;
            true
        });
    }

    fn status(&self) -> NodeStatus {
        let state = &self.state;
        NodeStatus {
            id: state.id(),
            role: state.role(),
            term: state.current_term(),
            voted_for: state.voted_for(),
            commit_index: state.commit_index(),
            last_applied: state.last_applied(),
            log_length: state.log().len(),
            leader_id: state.leader_id(),
        }
    }
}

/// A running raft node.
///
/// Must be started inside a tokio runtime; the election timer and the log
/// applier run as background tasks until [`Node::shutdown`].
pub struct Node {
    core: SharedCore,
    roles: watch::Receiver<Role>,
    timer: ElectionTimer,
    applier: LogApplier,
}

impl Node {
    /// Restore persisted state from `storage` and start the timer and applier
    pub fn start<M>(id: NodeId, config: &RaftConfig, storage: Box<dyn Storage>, machine: M) -> Result<Self>
    where
        M: StateMachine,
    {
        config.validate()?;
        let persisted = storage.load()?;
        info!(
            node = id,
            term = persisted.current_term,
            voted_for = ?persisted.voted_for,
            entries = persisted.log.len(),
            "restored persistent state"
        );
        let state = ConsensusState::restore(id, persisted.current_term, persisted.voted_for, persisted.log);

        let (role_tx, roles) = watch::channel(state.role());
        let core = Arc::new(Mutex::new(Core {
            state,
            storage,
            roles: role_tx,
            out_of_sync: false,
        }));

        let timer_core = Arc::clone(&core);
        let timer = ElectionTimer::start(config, move || {
            let mut core = lock(&timer_core);
            let campaigning = core.state.election_timed_out();
            if campaigning {
                core.announce_timeout();
            }
            // a lapsed election keeps the alarm running for the next attempt
            campaigning
        });

        let applier_core = Arc::clone(&core);
        let applier = LogApplier::start(
            config.apply_interval(),
            move || lock(&applier_core).state.drain_committed(),
            machine,
        );

        Ok(Self {
            core,
            roles,
            timer,
            applier,
        })
    }

    /// Vote rpc: decide, make the decision durable, then answer
    pub fn request_vote(&self, payload: &[u8]) -> Result<RequestVoteResponse> {
        let mut core = lock(&self.core);
        let saved = core.state.clone();
        let before = (saved.current_term(), saved.voted_for());

        let outcome = handle_vote(&mut core.state, payload);
        if let Err(err) = core.commit(saved, |core| core.persist_term_and_vote(before)) {
            error!(node = core.state.id(), error = %err, "failed to persist vote, state rolled back");
            return Err(err);
        }
        core.publish_role();
        if outcome.reset_timer {
            self.timer.reset();
        }
        Ok(outcome.response)
    }

    /// AppendEntries rpc: reconcile, make the log durable, then answer
    pub fn append_entries(&self, payload: &[u8]) -> Result<AppendEntriesResponse> {
        let mut core = lock(&self.core);
        let saved = core.state.clone();
        let before = (saved.current_term(), saved.voted_for());
        let previous_len = saved.log().len();

        let outcome = handle_append(&mut core.state, payload);
        let written = core.commit(saved, |core| core.persist_append(before, previous_len, outcome.reconciled));
        if let Err(err) = written {
            error!(node = core.state.id(), error = %err, "failed to persist AppendEntries, state rolled back");
            return Err(err);
        }
        core.publish_role();
        if outcome.reset_timer {
            self.timer.reset();
        }
        Ok(outcome.response)
    }

    pub fn status(&self) -> NodeStatus {
        lock(&self.core).status()
    }

    /// Read access to the consensus state, e.g. for computing prev index/term
    pub fn with_state<R>(&self, read: impl FnOnce(&ConsensusState) -> R) -> R {
        read(&lock(&self.core).state)
    }

    /// Watch role changes; the candidacy layer waits here for `Role::Candidate`.
    /// Every election timeout is announced, including one that lapses while
    /// already a candidate.
    pub fn roles(&self) -> watch::Receiver<Role> {
        self.roles.clone()
    }

    /// Stop the applier loop and cancel the pending election alarm
    pub async fn shutdown(self) {
        let id = lock(&self.core).state.id();
        self.timer.stop().await;
        self.applier.stop().await;
        info!(node = id, "node stopped");
    }
}
