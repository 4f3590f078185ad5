//! Debounced, coalescing queue of document changes.
//!
//! Every recorded change re-arms one shared quiet-period deadline. The queue
//! only tracks the deadline; the engine's pump task sleeps until it and then
//! drains the queue.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use vault_sync_domain::{ChangeKind, DocumentEvent, DocumentPath, PendingChange, coalesce};

#[derive(Debug, Clone)]
struct Slot {
    change: PendingChange,
    sequence: i64,
}

/// Per-path pending intents plus the shared debounce deadline.
#[derive(Debug)]
pub struct ChangeQueue {
    debounce: Duration,
    pending: HashMap<DocumentPath, Slot>,
    deadline: Option<Instant>,
    next_sequence: i64,
}

impl ChangeQueue {
    /// Queue with the given quiet period.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: HashMap::new(),
            deadline: None,
            next_sequence: 0,
        }
    }

    /// Quiet period.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a raw store event.
    ///
    /// Events on paths rejected by `indexable` are dropped. A rename becomes
    /// a delete of the old path plus a create of the new one, either half
    /// dropped when its path is not indexable. With `arm` false the change
    /// is recorded but the deadline is left untouched (paused engine).
    pub fn enqueue(
        &mut self,
        event: DocumentEvent,
        indexable: impl Fn(&DocumentPath) -> bool,
        observed_at_ms: u64,
        arm: bool,
    ) -> bool {
        let mut recorded = false;
        match event {
            DocumentEvent::Created { path } => {
                if indexable(&path) {
                    self.record(ChangeKind::Create, path, None, observed_at_ms);
                    recorded = true;
                }
            },
            DocumentEvent::Modified { path } => {
                if indexable(&path) {
                    self.record(ChangeKind::Modify, path, None, observed_at_ms);
                    recorded = true;
                }
            },
            DocumentEvent::Deleted { path } => {
                if indexable(&path) {
                    self.record(ChangeKind::Delete, path, None, observed_at_ms);
                    recorded = true;
                }
            },
            DocumentEvent::Renamed { path, old_path } => {
                if indexable(&old_path) {
                    self.record(ChangeKind::Delete, old_path.clone(), None, observed_at_ms);
                    recorded = true;
                }
                if indexable(&path) {
                    self.record(ChangeKind::Create, path, Some(old_path), observed_at_ms);
                    recorded = true;
                }
            },
        }
        if recorded && arm {
            self.arm(Instant::now());
        }
        recorded
    }

    fn record(
        &mut self,
        kind: ChangeKind,
        path: DocumentPath,
        previous_path: Option<DocumentPath>,
        observed_at_ms: u64,
    ) {
        if let Some(slot) = self.pending.get_mut(&path) {
            match coalesce(slot.change.kind, kind) {
                Some(net) => {
                    slot.change.kind = net;
                    slot.change.observed_at_ms = observed_at_ms;
                    if previous_path.is_some() {
                        slot.change.previous_path = previous_path;
                    }
                },
                None => {
                    self.pending.remove(&path);
                },
            }
            return;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.insert(
            path.clone(),
            Slot {
                change: PendingChange {
                    kind,
                    path,
                    previous_path,
                    observed_at_ms,
                },
                sequence,
            },
        );
    }

    /// Restart the quiet period from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    /// Cancel the pending deadline; queued changes are kept.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Current deadline, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True when the deadline passed at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Drain the queue when the quiet period elapsed.
    pub fn flush_if_due(&mut self, now: Instant) -> Vec<PendingChange> {
        if self.is_due(now) {
            self.flush()
        } else {
            Vec::new()
        }
    }

    /// Drain every pending change in first-seen order and disarm.
    pub fn flush(&mut self) -> Vec<PendingChange> {
        self.deadline = None;
        let mut slots: Vec<Slot> = self.pending.drain().map(|(_, slot)| slot).collect();
        slots.sort_by_key(|slot| slot.sequence);
        slots.into_iter().map(|slot| slot.change).collect()
    }

    /// Put back changes a flush could not submit, ahead of newer ones.
    ///
    /// Changes recorded since the drain win over the returned ones on the
    /// same path. The deadline is not re-armed.
    pub fn requeue(&mut self, changes: Vec<PendingChange>) {
        let mut sequence = self
            .pending
            .values()
            .map(|slot| slot.sequence)
            .min()
            .unwrap_or(self.next_sequence);
        for change in changes.into_iter().rev() {
            if let Some(newer) = self.pending.get_mut(&change.path) {
                match coalesce(change.kind, newer.change.kind) {
                    Some(net) => newer.change.kind = net,
                    None => {
                        self.pending.remove(&change.path);
                    },
                }
                continue;
            }
            sequence -= 1;
            self.pending.insert(change.path.clone(), Slot { change, sequence });
        }
    }

    /// Number of paths with a pending change.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending change and the deadline.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }
}
