//! # config
//!
//! why: collect the timing knobs a node runs with
//! relations: validated here, consumed by raft-server's election timer and log applier
//! what: RaftConfig with defaults and range validation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Timing configuration for a raft node, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftConfig {
    /// Lower bound of the randomized election timeout
    pub election_timeout_min: u64,
    /// Upper bound (inclusive) of the randomized election timeout
    pub election_timeout_max: u64,
    /// Pause between log applier polls
    pub apply_interval: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 150,
            election_timeout_max: 300,
            apply_interval: 100,
        }
    }
}

impl RaftConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.election_timeout_min == 0 {
            return Err(ConfigError::ZeroElectionTimeout);
        }
        if self.election_timeout_min > self.election_timeout_max {
            return Err(ConfigError::InvertedElectionTimeout {
                min: self.election_timeout_min,
                max: self.election_timeout_max,
            });
        }
        if self.apply_interval == 0 {
            return Err(ConfigError::ZeroApplyInterval);
        }
        Ok(())
    }

    pub fn apply_interval(&self) -> Duration {
        Duration::from_millis(self.apply_interval)
    }
}
