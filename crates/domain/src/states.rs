//! Engine run state machine and progress events.

use crate::{DocumentPath, FailedEntry, IndexResult, RemoteResourceId};
use serde::{Deserialize, Serialize};

/// Engine-wide lifecycle state. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunState {
    /// Not initialized, or shut down.
    Disabled,
    /// Ready; no work in flight.
    Idle,
    /// A full run or a pending-change flush is uploading.
    Indexing,
    /// Operator pause; changes are recorded but not flushed.
    Paused,
    /// Provider asked us to back off until `resume_at_ms`.
    #[serde(rename_all = "camelCase")]
    RateLimited {
        /// Cooldown end (epoch ms).
        resume_at_ms: u64,
    },
    /// Unrecoverable initialization or reconciliation failure.
    Error {
        /// Human-readable reason.
        reason: Box<str>,
    },
}

/// Inputs to the run state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// Remote store reachable or created.
    Initialized,
    /// Full run or flush starts uploading.
    WorkStarted,
    /// Full run or flush finished.
    WorkFinished,
    /// Provider signalled a rate limit.
    RateLimited {
        /// Cooldown end (epoch ms).
        resume_at_ms: u64,
    },
    /// Cooldown elapsed.
    CooldownElapsed,
    /// Operator pause.
    Pause,
    /// Operator resume.
    Resume,
    /// Unrecoverable failure.
    Fail {
        /// Human-readable reason.
        reason: Box<str>,
    },
    /// Explicit shutdown.
    Shutdown,
}

impl RunState {
    /// Snake-case label matching the serialized `status` tag.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Idle => "idle",
            Self::Indexing => "indexing",
            Self::Paused => "paused",
            Self::RateLimited { .. } => "rate_limited",
            Self::Error { .. } => "error",
        }
    }

    /// Next state for `event`, or `None` when the event does not apply.
    #[must_use]
    pub fn transition(&self, event: &RunEvent) -> Option<Self> {
        match (self, event) {
            (_, RunEvent::Shutdown) => Some(Self::Disabled),
            (_, RunEvent::Fail { reason }) => Some(Self::Error {
                reason: reason.clone(),
            }),
            (Self::Disabled | Self::Error { .. }, RunEvent::Initialized)
            | (Self::Indexing, RunEvent::WorkFinished)
            | (Self::RateLimited { .. }, RunEvent::CooldownElapsed)
            | (Self::Paused, RunEvent::Resume) => Some(Self::Idle),
            (Self::Idle, RunEvent::WorkStarted) => Some(Self::Indexing),
            (Self::Indexing | Self::RateLimited { .. }, RunEvent::RateLimited { resume_at_ms }) => {
                Some(Self::RateLimited {
                    resume_at_ms: *resume_at_ms,
                })
            },
            (Self::Idle | Self::Indexing | Self::RateLimited { .. }, RunEvent::Pause) => {
                Some(Self::Paused)
            },
            _ => None,
        }
    }

    /// True when uploads may be started.
    #[must_use]
    pub const fn accepts_work(&self) -> bool {
        matches!(self, Self::Idle | Self::Indexing)
    }
}

/// Progress events broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Progress update for a named phase.
    Progress {
        /// Phase identifier (`full_run`, `flush`).
        phase: Box<str>,
        /// Documents processed.
        current: u64,
        /// Documents planned.
        total: u64,
        /// Completion percentage (0-100).
        percentage: u8,
    },
    /// Engine state changed.
    State {
        /// New state.
        state: RunState,
    },
    /// One document uploaded and recorded.
    #[serde(rename_all = "camelCase")]
    DocumentIndexed {
        /// Document path.
        path: DocumentPath,
        /// Provider id of the upload.
        remote_resource_id: RemoteResourceId,
    },
    /// One document removed from the local cache.
    DocumentRemoved {
        /// Document path.
        path: DocumentPath,
    },
    /// One document failed terminally or exhausted retries.
    DocumentFailed {
        /// Failure record.
        failure: FailedEntry,
    },
    /// A full run finished (possibly early).
    RunCompleted {
        /// Run counts.
        result: IndexResult,
    },
}

impl ProgressEvent {
    /// Build a progress event with computed percentage.
    #[must_use]
    pub fn progress(phase: impl AsRef<str>, current: u64, total: u64) -> Self {
        Self::Progress {
            phase: phase.as_ref().into(),
            current,
            total,
            percentage: progress_percentage(current, total),
        }
    }

    /// Build a state change event.
    #[must_use]
    pub const fn state(state: RunState) -> Self {
        Self::State { state }
    }
}

fn progress_percentage(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = current.min(total).saturating_mul(100) / total;
    u8::try_from(percent).unwrap_or(u8::MAX)
}
