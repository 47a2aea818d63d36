//! # raft-storage
//!
//! why: keep the (current term, voted for, log) triple durable across restarts
//! relations: stores raft-core's LogEntry, driven by raft-server's node after every state change
//! what: Storage trait, FileStorage (json files, atomic replace), InMemoryStorage for testing

use raft_core::{LogEntry, NodeId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// failure to read or write persisted raft state
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("persisted state is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// everything a node must find again after a crash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistentState {
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub log: Vec<LogEntry>,
}

/// trait for durable storage of raft state
///
/// this abstraction allows the same node to run against:
/// - real filesystem (production)
/// - in-memory (testing)
pub trait Storage: Send {
    /// persist the current term and voted_for
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<NodeId>) -> Result<()>;

    /// load the persisted term and voted_for
    fn load_term_and_vote(&self) -> Result<(u64, Option<NodeId>)>;

    /// append entries to the end of the log
    fn append_entries(&mut self, entries: &[LogEntry]) -> Result<()>;

    /// load all log entries (for crash recovery)
    fn load_log(&self) -> Result<Vec<LogEntry>>;

    /// keep only the first `count` entries (for conflict resolution)
    fn truncate_log_to(&mut self, count: u64) -> Result<()>;

    /// clear all persisted state (for testing)
    fn clear(&mut self) -> Result<()>;

    /// load the whole triple in one go
    fn load(&self) -> Result<PersistentState> {
        let (current_term, voted_for) = self.load_term_and_vote()?;
        Ok(PersistentState {
            current_term,
            voted_for,
            log: self.load_log()?,
        })
    }
}

// -- file storage implementation --

/// file-based storage implementation using std::fs
///
/// stores raft state in a directory with:
/// - meta.json: term and voted_for
/// - log.json: array of log entries
pub struct FileStorage {
    /// directory path for storing state files
    dir: PathBuf,
}

impl FileStorage {
    /// create a new filestorage at the given directory
    /// creates the directory if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("log.json")
    }

    /// write to a temp file, fsync, then rename over the target
    fn write_atomic<T: Serialize>(&self, target: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        let temp_path = target.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&temp_path, target)?;
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// metadata structure for term and vote
#[derive(Serialize, Deserialize, Default)]
struct MetaData {
    term: u64,
    voted_for: Option<NodeId>,
}

impl Storage for FileStorage {
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<NodeId>) -> Result<()> {
        self.write_atomic(&self.meta_path(), &MetaData { term, voted_for })
    }

    fn load_term_and_vote(&self) -> Result<(u64, Option<NodeId>)> {
        // default for new nodes
        let meta: MetaData = Self::read_json(&self.meta_path())?.unwrap_or_default();
        Ok((meta.term, meta.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // whole-file rewrite keeps the file valid json at every point
        let mut log = self.load_log()?;
        log.extend_from_slice(entries);
        self.write_atomic(&self.log_path(), &log)
    }

    fn load_log(&self) -> Result<Vec<LogEntry>> {
        Ok(Self::read_json(&self.log_path())?.unwrap_or_default())
    }

    fn truncate_log_to(&mut self, count: u64) -> Result<()> {
        let mut log = self.load_log()?;
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        if count >= log.len() {
            return Ok(());
        }
        log.truncate(count);
        self.write_atomic(&self.log_path(), &log)
    }

    fn clear(&mut self) -> Result<()> {
        for path in [self.meta_path(), self.log_path()] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

// -- in-memory storage implementation --

/// in-memory storage for testing
///
/// stores all state in memory, no persistence across restarts
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    term: u64,
    voted_for: Option<NodeId>,
    log: Vec<LogEntry>,
}

impl InMemoryStorage {
    /// create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<NodeId>) -> Result<()> {
        self.term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn load_term_and_vote(&self) -> Result<(u64, Option<NodeId>)> {
        Ok((self.term, self.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> Result<()> {
        self.log.extend_from_slice(entries);
        Ok(())
    }

    fn load_log(&self) -> Result<Vec<LogEntry>> {
        Ok(self.log.clone())
    }

    fn truncate_log_to(&mut self, count: u64) -> Result<()> {
        self.log.truncate(usize::try_from(count).unwrap_or(usize::MAX));
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.term = 0;
        self.voted_for = None;
        self.log.clear();
        Ok(())
    }
}
