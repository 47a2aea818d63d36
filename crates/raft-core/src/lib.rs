//! # raft-core
//!
//! why: implement the follower/candidate side of raft consensus in pure, portable rust
//! relations: used by raft-storage for persistence types, raft-server for the runtime
//! what: replicated log, consensus state, rpc messages and handlers, configuration

pub mod config;
pub mod error;
pub mod handler;
pub mod log;
pub mod message;
pub mod state;

pub use config::RaftConfig;
pub use error::{ConfigError, MessageError};
pub use handler::{handle_append, handle_vote};
pub use log::{LogEntry, ReplicatedLog};
pub use message::{AppendEntries, AppendEntriesResponse, NodeId, RequestVote, RequestVoteResponse};
pub use state::{AppendOutcome, ConsensusState, Reconciled, Role, VoteOutcome};
