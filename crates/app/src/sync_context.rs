//! State shared by full runs, flushes, and the engine API.

use crate::change_queue::ChangeQueue;
use crate::content_hasher::ContentHasher;
use crate::index_cache::IndexCache;
use crate::log::EngineLog;
use crate::rate_limit::{RateLimitGuard, RunStateCell};
use crate::retry::{RetryingUploader, UploadAttempt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;
use vault_sync_domain::{
    ChangeKind, DocumentPath, FailedEntry, FailureKind, FailureLog, IndexedEntry, ProgressEvent,
    RunEvent, StoreId,
};
use vault_sync_ports::{DocumentContent, DocumentStorePort, LogLevel, log_fields};
use vault_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, now_epoch_ms};

/// Phase label of full-run progress events.
pub(crate) const FULL_RUN_PHASE: &str = "full_run";
/// Phase label of flush progress events.
pub(crate) const FLUSH_PHASE: &str = "flush";

/// What happened to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentOutcome {
    Indexed,
    Unchanged,
    BelowMinimumSize,
    /// Gone between enumeration and read; a delete event follows.
    Vanished,
    Failed,
    /// Not submitted; a cooldown is active.
    RateLimited,
    /// Not submitted; the run was cancelled or the engine paused.
    Halted,
}

pub(crate) struct SyncContext {
    pub(crate) documents: Arc<dyn DocumentStorePort>,
    pub(crate) hasher: ContentHasher,
    pub(crate) uploader: RetryingUploader,
    pub(crate) cache: tokio::sync::Mutex<IndexCache>,
    pub(crate) queue: Mutex<ChangeQueue>,
    pub(crate) failures: Mutex<FailureLog>,
    pub(crate) state: RunStateCell,
    pub(crate) guard: RateLimitGuard,
    pub(crate) progress: broadcast::Sender<ProgressEvent>,
    /// Serializes full runs and flushes.
    pub(crate) work_lock: tokio::sync::Mutex<()>,
    pub(crate) persist_every: usize,
    /// Cancelled once, at shutdown.
    pub(crate) lifetime: RequestContext,
    /// Wakes the pump after state changes it must react to.
    pub(crate) wake: Notify,
    pub(crate) flush_requested: AtomicBool,
    pub(crate) log: EngineLog,
}

impl SyncContext {
    pub(crate) fn queue(&self) -> MutexGuard<'_, ChangeQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn failures(&self) -> MutexGuard<'_, FailureLog> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the pump to flush on its next wakeup.
    pub(crate) fn request_flush(&self) {
        self.flush_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub(crate) fn take_flush_request(&self) -> bool {
        self.flush_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        let _ = self.progress.send(event);
    }

    /// Bring one document up to date with the provider.
    ///
    /// `halt` stops the document before submission. Returns `Err` only when
    /// the engine is shutting down.
    pub(crate) async fn sync_document(
        &self,
        halt: &RequestContext,
        store_id: &StoreId,
        path: &DocumentPath,
    ) -> Result<DocumentOutcome> {
        if halt.is_cancelled() || self.state.is_halted() {
            return Ok(DocumentOutcome::Halted);
        }
        if self.guard.is_limited(Instant::now()) {
            return Ok(DocumentOutcome::RateLimited);
        }

        let hashed = match self
            .hasher
            .fingerprint(&self.lifetime, self.documents.as_ref(), path)
            .await
        {
            Ok(hashed) => hashed,
            Err(error) => return self.read_failed(path, &error),
        };
        let unchanged = self
            .cache
            .lock()
            .await
            .entry_for(path)
            .is_some_and(|entry| entry.fingerprint == hashed.fingerprint);
        if unchanged {
            return Ok(DocumentOutcome::Unchanged);
        }

        let content: DocumentContent = match hashed.content {
            Some(content) => content,
            None => match self.documents.read(&self.lifetime, path.clone()).await {
                Ok(content) => content,
                Err(error) => return self.read_failed(path, &error),
            },
        };

        let attempt = self
            .uploader
            .upload(&self.lifetime, store_id, path, &content, &hashed.fingerprint)
            .await?;
        match attempt {
            UploadAttempt::Uploaded { resource_id, .. } => {
                self.cache.lock().await.upsert(IndexedEntry {
                    path: path.clone(),
                    remote_resource_id: resource_id.clone(),
                    fingerprint: hashed.fingerprint,
                    last_indexed_at_ms: now_epoch_ms(),
                });
                self.failures().clear_path(path);
                self.emit(ProgressEvent::DocumentIndexed {
                    path: path.clone(),
                    remote_resource_id: resource_id,
                });
                Ok(DocumentOutcome::Indexed)
            },
            UploadAttempt::BelowMinimumSize => Ok(DocumentOutcome::BelowMinimumSize),
            UploadAttempt::Failed {
                error,
                kind: FailureKind::RateLimited,
                ..
            } => {
                self.guard.trip(&self.state, error.retry_after());
                self.wake.notify_one();
                Ok(DocumentOutcome::RateLimited)
            },
            UploadAttempt::Failed {
                error,
                kind,
                attempts,
            } => {
                self.record_failure(path, &error, kind, attempts);
                Ok(DocumentOutcome::Failed)
            },
        }
    }

    fn read_failed(&self, path: &DocumentPath, error: &ErrorEnvelope) -> Result<DocumentOutcome> {
        if error.is_cancelled() {
            return Err(error.clone());
        }
        if error.code == ErrorCode::not_found() {
            self.log.debug(
                "sync.document.vanished",
                "Document disappeared before it could be read",
                Some(log_fields([("path", path.as_str())])),
            );
            return Ok(DocumentOutcome::Vanished);
        }
        self.record_failure(path, error, FailureKind::Terminal, 0);
        Ok(DocumentOutcome::Failed)
    }

    fn record_failure(
        &self,
        path: &DocumentPath,
        error: &ErrorEnvelope,
        kind: FailureKind,
        attempts: u32,
    ) {
        self.log.failure(
            LogLevel::Error,
            "sync.document.failed",
            "Document could not be indexed",
            Some(log_fields([
                ("path", serde_json::Value::from(path.as_str())),
                (
                    "kind",
                    serde_json::to_value(kind).unwrap_or(serde_json::Value::Null),
                ),
                ("attempts", serde_json::Value::from(attempts)),
            ])),
            error,
        );
        let failure = FailedEntry {
            path: path.clone(),
            error_message: error.message.as_str().into(),
            timestamp_ms: now_epoch_ms(),
            kind,
            attempts,
        };
        self.failures().record(failure.clone());
        self.emit(ProgressEvent::DocumentFailed { failure });
    }

    /// Forget `path` locally; returns true when it was indexed.
    pub(crate) async fn remove_document(&self, path: &DocumentPath) -> bool {
        let removed = {
            let mut cache = self.cache.lock().await;
            self.uploader.pipeline().delete(&mut cache, path).is_some()
        };
        self.failures().clear_path(path);
        if removed {
            self.emit(ProgressEvent::DocumentRemoved { path: path.clone() });
        }
        removed
    }

    /// Write the cache; failures are logged and left for the next persist.
    pub(crate) async fn persist(&self, cache: &mut IndexCache) {
        if let Err(error) = cache.persist(&RequestContext::new_request()).await {
            self.log.failure(
                LogLevel::Warn,
                "sync.cache.persist_failed",
                "Index cache could not be written",
                None,
                &error,
            );
        }
    }

    /// Submit every queued change.
    ///
    /// Waits for an active full run to finish first. Returns false when the
    /// engine cannot take work or the queue is empty. Changes that could not
    /// be submitted (cooldown, pause, shutdown) go back to the queue.
    pub(crate) async fn flush_pending(&self) -> bool {
        let _work = self.work_lock.lock().await;
        if !self.state.accepts_work() || self.guard.is_limited(Instant::now()) {
            return false;
        }
        let changes = self.queue().flush();
        if changes.is_empty() {
            return false;
        }
        let Some(store_id) = self.cache.lock().await.store_id().cloned() else {
            self.queue().requeue(changes);
            return false;
        };

        self.state.apply(&RunEvent::WorkStarted);
        let total = u64::try_from(changes.len()).unwrap_or(u64::MAX);
        self.log.info(
            "sync.flush.start",
            "Submitting queued changes",
            Some(log_fields([("changes", total)])),
        );

        let halt = RequestContext::new_request();
        let mut processed = 0_u64;
        let mut deferred = Vec::new();
        let mut remaining = changes.into_iter();
        for change in remaining.by_ref() {
            if self.state.is_halted() || self.guard.is_limited(Instant::now()) {
                deferred.push(change);
                break;
            }
            self.state.apply(&RunEvent::WorkStarted);
            let submitted = match change.kind {
                ChangeKind::Delete => {
                    self.remove_document(&change.path).await;
                    true
                },
                ChangeKind::Create | ChangeKind::Modify => matches!(
                    self.sync_document(&halt, &store_id, &change.path).await,
                    Ok(outcome) if !matches!(
                        outcome,
                        DocumentOutcome::RateLimited | DocumentOutcome::Halted
                    )
                ),
            };
            if !submitted {
                deferred.push(change);
                break;
            }
            processed += 1;
            self.emit(ProgressEvent::progress(FLUSH_PHASE, processed, total));
        }
        deferred.extend(remaining);

        if !deferred.is_empty() {
            self.log.debug(
                "sync.flush.deferred",
                "Changes returned to the queue",
                Some(log_fields([("changes", deferred.len())])),
            );
            self.queue().requeue(deferred);
        }
        {
            let mut cache = self.cache.lock().await;
            self.persist(&mut cache).await;
        }
        self.state.apply(&RunEvent::WorkFinished);
        self.log.info(
            "sync.flush.complete",
            "Queued changes submitted",
            Some(log_fields([("processed", processed), ("total", total)])),
        );
        true
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncContext")
            .field("state", &self.state.current())
            .field("pending", &self.queue().len())
            .finish_non_exhaustive()
    }
}
