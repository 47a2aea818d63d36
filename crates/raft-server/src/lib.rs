//! # raft-server
//!
//! why: turn raft-core's state transitions into a running node
//! relations: uses raft-core for protocol logic, raft-storage for durability
//! what: election timer, log applier, node runtime behind one lock, http transport, cli

pub mod applier;
pub mod cli;
pub mod error;
pub mod http;
pub mod node;
pub mod timer;

pub use applier::{LogApplier, LoggingStateMachine, StateMachine};
pub use error::{NodeError, Result};
pub use node::{Node, NodeStatus};
pub use timer::ElectionTimer;
