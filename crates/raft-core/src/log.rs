//! # log
//!
//! why: hold the ordered, term-tagged sequence of commands that raft replicates
//! relations: owned by state.rs, persisted via raft-storage, read by leader-side code for prev index/term
//! what: LogEntry struct, ReplicatedLog with 1-based positional lookup, append and suffix truncation

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single entry in the replicated log
///
/// The entry's position in the log is its identity; it is not stored on the struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term in which a leader accepted this entry
    pub term: u64,
    /// Opaque command bytes handed to the application once applied
    pub data: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            term,
            data: data.into(),
        }
    }
}

/// Append-only, truncatable sequence of entries.
///
/// Indices are 1-based; index 0 means "before the first entry" and has term 0.
/// The log does not guard committed entries, callers must never truncate below
/// their commit index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicatedLog {
    entries: Vec<LogEntry>,
}

impl ReplicatedLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from entries loaded out of storage
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    /// Append entries after the current end
    pub fn append<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.entries.extend(entries);
    }

    /// Keep only the first `count` entries
    pub fn truncate_to(&mut self, count: u64) {
        if let Ok(count) = usize::try_from(count) {
            self.entries.truncate(count);
        }
    }

    /// Entry at a 1-based index, `None` for 0 or anything past the end
    pub fn at(&self, index: u64) -> Option<&LogEntry> {
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.entries.get(position)
    }

    /// Number of entries, which is also the last index
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry (0 for an empty log)
    pub fn last_index(&self) -> u64 {
        self.len()
    }

    /// Term of the last entry (0 for an empty log)
    pub fn last_term(&self) -> u64 {
        self.entries.last().map_or(0, |entry| entry.term)
    }

    /// Entries strictly after the first `count`
    pub fn entries_after(&self, count: u64) -> &[LogEntry] {
        let start = usize::try_from(count)
            .unwrap_or(usize::MAX)
            .min(self.entries.len());
        &self.entries[start..]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

impl fmt::Display for ReplicatedLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{{{} {}}}", entry.term, String::from_utf8_lossy(&entry.data))?;
        }
        f.write_str("]")
    }
}
