//! Run results, failure records, and the status snapshot.

use crate::{DocumentPath, RunState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// How a failed upload was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network blip or malformed response; retried with backoff.
    Transient,
    /// Provider rate limit; suspends the engine instead of failing a document.
    RateLimited,
    /// Authentication or permanent validation failure; never retried.
    Terminal,
    /// Operation polling exceeded its bound.
    Timeout,
}

impl FailureKind {
    /// True when another attempt may succeed within the same run.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Most recent failure of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntry {
    /// Document path.
    pub path: DocumentPath,
    /// Operator-facing message.
    pub error_message: Box<str>,
    /// Failure time (epoch ms).
    pub timestamp_ms: u64,
    /// Classification.
    pub kind: FailureKind,
    /// Attempts made before giving up.
    pub attempts: u32,
}

/// Failing paths plus a bounded, newest-first log with one record per path.
///
/// The count covers every failing path; only the detailed records are
/// bounded by `capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLog {
    capacity: usize,
    entries: VecDeque<FailedEntry>,
    failing: BTreeSet<DocumentPath>,
}

impl FailureLog {
    /// Empty log holding at most `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            failing: BTreeSet::new(),
        }
    }

    /// Record a failure, replacing any older record for the same path.
    pub fn record(&mut self, entry: FailedEntry) {
        self.entries.retain(|existing| existing.path != entry.path);
        self.failing.insert(entry.path.clone());
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Drop the record for `path` after a successful upload.
    pub fn clear_path(&mut self, path: &DocumentPath) -> bool {
        self.entries.retain(|existing| &existing.path != path);
        self.failing.remove(path)
    }

    /// Number of paths currently failing, including ones whose record
    /// fell out of the bounded log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failing.len()
    }

    /// True when no path is failing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failing.is_empty()
    }

    /// Newest-first snapshot.
    #[must_use]
    pub fn recent(&self) -> Vec<FailedEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Forget every record.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.failing.clear();
    }
}

/// Counts from one full run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResult {
    /// Uploaded and recorded.
    pub indexed: u64,
    /// Unchanged since the last upload, or below the admission size.
    pub skipped: u64,
    /// Failed terminally or exhausted retries.
    pub failed: u64,
    /// Cache entries pruned because the document is gone or excluded.
    pub removed: u64,
    /// True when cancellation or pause stopped the run before the end.
    pub stopped_early: bool,
    /// Wall-clock duration (ms).
    pub duration_ms: u64,
}

/// Status snapshot exposed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Current engine state.
    pub state: RunState,
    /// Entries in the index cache.
    pub indexed_count: u64,
    /// Paths waiting in the change queue.
    pub pending_count: u64,
    /// Paths with a recorded failure.
    pub failed_count: u64,
    /// Completion time of the last full pass (epoch ms).
    pub last_full_sync_ms: Option<u64>,
    /// Newest-first failure records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_failures: Vec<FailedEntry>,
}
