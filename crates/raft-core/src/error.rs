//! # error
//!
//! why: name the few ways input at the crate boundary can be unusable
//! relations: returned by message.rs codecs and config.rs validation
//! what: MessageError, ConfigError

use thiserror::Error;

/// Failure to turn an rpc payload into a typed message, or back
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed rpc payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode rpc message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Rejected raft configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("election timeout minimum must be positive")]
    ZeroElectionTimeout,
    #[error("election timeout range is inverted: min {min}ms > max {max}ms")]
    InvertedElectionTimeout { min: u64, max: u64 },
    #[error("apply interval must be positive")]
    ZeroApplyInterval,
}
