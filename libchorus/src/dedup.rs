//! Duplicate content detection
//!
//! Generated text is hashed (lower-cased SHA-256) and compared against a
//! bounded history of everything posted before. Only exact matches after
//! case folding count as duplicates.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::state::{read_snapshot, write_snapshot, SNAPSHOT_VERSION};

/// Number of most recent entries retained
pub const HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub content: String,
    pub hash: String,
    /// Unix timestamp of when the entry was recorded
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize)]
struct HistorySnapshot {
    version: u32,
    entries: VecDeque<HistoryEntry>,
}

/// Normalized content hash: hex SHA-256 of the lower-cased text
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.to_lowercase().as_bytes());
    format!("{:x}", digest)
}

pub struct DedupCache {
    entries: VecDeque<HistoryEntry>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl DedupCache {
    /// Load the history stored at `path`
    ///
    /// Never fails: a missing, unreadable or malformed snapshot is logged and
    /// the cache starts empty.
    pub fn load(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let entries = match read_snapshot::<HistorySnapshot>(&path) {
            Ok(Some(snapshot)) => {
                debug!(path = %path.display(), entries = snapshot.entries.len(), "Loaded post history");
                snapshot.entries
            }
            Ok(None) => VecDeque::new(),
            Err(e) => {
                warn!(path = %path.display(), "Ignoring unreadable post history: {}", e);
                VecDeque::new()
            }
        };

        let mut cache = Self {
            entries,
            path: Some(path),
            clock,
        };
        cache.truncate();
        cache
    }

    /// A cache that is never persisted
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: VecDeque::new(),
            path: None,
            clock,
        }
    }

    pub fn is_duplicate(&self, text: &str) -> bool {
        let hash = content_hash(text);
        self.entries.iter().any(|entry| entry.hash == hash)
    }

    /// Remember `text` and persist the history
    pub fn record(&mut self, text: &str) {
        self.entries.push_back(HistoryEntry {
            content: text.to_string(),
            hash: content_hash(text),
            timestamp: self.clock.now(),
        });
        self.truncate();
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn truncate(&mut self) {
        while self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_front();
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let snapshot = HistorySnapshot {
            version: SNAPSHOT_VERSION,
            entries: self.entries.clone(),
        };
        if let Err(e) = write_snapshot(path, &snapshot) {
            warn!(path = %path.display(), "Failed to save post history: {}", e);
        }
    }
}
