//! # message
//!
//! why: define the raft rpc arguments and results exchanged between nodes
//! relations: decoded by handler.rs, consumed by state.rs, encoded by the transport in raft-server
//! what: RequestVote, RequestVoteResponse, AppendEntries, AppendEntriesResponse and their json codec

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::MessageError;
use crate::log::LogEntry;

/// Identifier of a node in the cluster
pub type NodeId = u64;

/// Vote solicitation sent by a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVote {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

/// Reply to a vote solicitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    /// Term the voter recognizes, so a stale candidate can update itself
    pub term: u64,
    pub vote_granted: bool,
}

/// Log replication from the leader (also serves as heartbeat when entries is empty)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntries {
    pub term: u64,
    /// Lets followers point clients at the leader
    pub leader_id: NodeId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

/// Reply to AppendEntries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    /// True if the follower held an entry matching prev_log_index and prev_log_term
    pub success: bool,
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, MessageError> {
    serde_json::from_slice(payload).map_err(MessageError::Decode)
}

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, MessageError> {
    serde_json::to_vec(message).map_err(MessageError::Encode)
}

impl RequestVote {
    pub fn from_json(payload: &[u8]) -> Result<Self, MessageError> {
        decode(payload)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }
}

impl RequestVoteResponse {
    pub fn from_json(payload: &[u8]) -> Result<Self, MessageError> {
        decode(payload)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }
}

impl AppendEntries {
    pub fn from_json(payload: &[u8]) -> Result<Self, MessageError> {
        decode(payload)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    /// True when the leader is only asserting leadership
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AppendEntriesResponse {
    pub fn from_json(payload: &[u8]) -> Result<Self, MessageError> {
        decode(payload)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_term_fails_to_decode() {
        let payload = br#"{"term":-1,"leader_id":2,"prev_log_index":0,"prev_log_term":1,"entries":[],"leader_commit":0}"#;
        assert!(matches!(
            AppendEntries::from_json(payload),
            Err(MessageError::Decode(_))
        ));
    }

    #[test]
    fn missing_entries_field_decodes_as_heartbeat() {
        let payload = br#"{"term":3,"leader_id":2,"prev_log_index":0,"prev_log_term":0,"leader_commit":0}"#;
        let ae = AppendEntries::from_json(payload).unwrap();
        assert!(ae.is_heartbeat());
        assert_eq!(ae.term, 3);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(RequestVote::from_json(br#"{"somedata": "crap"}"#).is_err());
        assert!(RequestVote::from_json(b"not json").is_err());
    }

    #[test]
    fn append_entries_survives_the_wire() {
        let ae = AppendEntries {
            term: 1,
            leader_id: 2,
            prev_log_index: 3,
            prev_log_term: 1,
            entries: vec![LogEntry::new(1, "1"), LogEntry::new(2, "2")],
            leader_commit: 4,
        };
        let bytes = ae.to_json().unwrap();
        assert_eq!(AppendEntries::from_json(&bytes).unwrap(), ae);
    }
}
