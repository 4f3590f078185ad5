//! Single-flight full index runs with cooperative cancellation.

use crate::sync_context::{DocumentOutcome, FULL_RUN_PHASE, SyncContext};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;
use vault_sync_domain::{DocumentPath, IndexResult, ProgressEvent, RunEvent, RunState};
use vault_sync_ports::{BoxFuture, LogLevel, log_fields};
use vault_sync_shared::{
    CancellationToken, CorrelationId, ErrorCode, ErrorEnvelope, RequestContext, Result,
    SingleFlight, now_epoch_ms,
};

/// Runs full passes over the vault, at most one at a time.
///
/// Concurrent callers join the run in flight and receive its result.
/// Cancellation is checked between documents; a document already submitted
/// finishes and is recorded.
pub struct IndexRunController {
    context: Arc<SyncContext>,
    flight: SingleFlight<IndexResult>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl IndexRunController {
    pub(crate) fn new(context: Arc<SyncContext>) -> Self {
        Self {
            context,
            flight: SingleFlight::new(),
            cancel: Mutex::new(None),
        }
    }

    /// Start a full run, or join the one in flight.
    pub async fn run_full_index(&self) -> Result<IndexResult> {
        let (run, _started) = self.flight.join_or_start(|| {
            let token = CancellationToken::new();
            *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
            let run_ctx = RequestContext::with_cancellation(CorrelationId::new_run_id(), token);
            let context = Arc::clone(&self.context);
            let work: BoxFuture<'static, Result<IndexResult>> =
                Box::pin(async move { execute_full_run(&context, &run_ctx).await });
            work
        });
        run.await
    }

    /// Request the active run to stop after its current document.
    ///
    /// Returns false when no run is in flight.
    pub fn cancel(&self) -> bool {
        if !self.flight.is_running() {
            return false;
        }
        let slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// True while a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }
}

impl std::fmt::Debug for IndexRunController {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IndexRunController")
            .field("running", &self.flight.is_running())
            .finish_non_exhaustive()
    }
}

fn not_ready(state: &RunState) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("engine", "not_ready"),
        format!("engine cannot index while {}", state.label()),
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn execute_full_run(context: &SyncContext, run_ctx: &RequestContext) -> Result<IndexResult> {
    let started = Instant::now();
    let _work = context.work_lock.lock().await;

    match context.state.current() {
        RunState::Paused => {
            return Ok(IndexResult {
                stopped_early: true,
                ..IndexResult::default()
            });
        },
        state @ (RunState::Disabled | RunState::Error { .. }) => return Err(not_ready(&state)),
        RunState::RateLimited { .. } => {
            if context.guard.wait(run_ctx, &context.state).await.is_err() {
                return Ok(IndexResult {
                    stopped_early: true,
                    duration_ms: elapsed_ms(started),
                    ..IndexResult::default()
                });
            }
        },
        RunState::Idle | RunState::Indexing => {},
    }
    let Some(store_id) = context.cache.lock().await.store_id().cloned() else {
        return Err(not_ready(&context.state.current()));
    };

    context.state.apply(&RunEvent::WorkStarted);
    let log = context.log.child("full_run");
    log.info(
        "sync.run.start",
        "Full index run started",
        Some(log_fields([("runId", run_ctx.correlation_id().as_str())])),
    );

    let paths = match context.documents.enumerate(run_ctx).await {
        Ok(paths) => paths,
        Err(error) if error.is_cancelled() => {
            let result = IndexResult {
                stopped_early: true,
                duration_ms: elapsed_ms(started),
                ..IndexResult::default()
            };
            finish(context, result);
            return Ok(result);
        },
        Err(error) => {
            log.failure(
                LogLevel::Error,
                "sync.run.enumerate_failed",
                "Vault enumeration failed",
                None,
                &error,
            );
            context.state.apply(&RunEvent::WorkFinished);
            return Err(error);
        },
    };

    let total = u64::try_from(paths.len()).unwrap_or(u64::MAX);
    let mut result = IndexResult::default();
    let mut since_persist = 0_usize;
    let mut processed = 0_u64;

    'documents: for path in &paths {
        if run_ctx.is_cancelled() || context.state.is_halted() {
            result.stopped_early = true;
            break;
        }
        // A pause lifted while the previous document was in flight leaves
        // the engine idle.
        context.state.apply(&RunEvent::WorkStarted);
        loop {
            let outcome = match context.sync_document(run_ctx, &store_id, path).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    result.stopped_early = true;
                    break 'documents;
                },
            };
            match outcome {
                DocumentOutcome::Indexed => {
                    result.indexed += 1;
                    since_persist += 1;
                    if since_persist >= context.persist_every {
                        let mut cache = context.cache.lock().await;
                        context.persist(&mut cache).await;
                        since_persist = 0;
                    }
                },
                DocumentOutcome::Unchanged
                | DocumentOutcome::BelowMinimumSize
                | DocumentOutcome::Vanished => result.skipped += 1,
                DocumentOutcome::Failed => result.failed += 1,
                DocumentOutcome::RateLimited => {
                    if context.guard.wait(run_ctx, &context.state).await.is_err() {
                        result.stopped_early = true;
                        break 'documents;
                    }
                    context.state.apply(&RunEvent::WorkStarted);
                    continue;
                },
                DocumentOutcome::Halted => {
                    result.stopped_early = true;
                    break 'documents;
                },
            }
            break;
        }
        processed += 1;
        context.emit(ProgressEvent::progress(FULL_RUN_PHASE, processed, total));
    }

    if !result.stopped_early {
        result.removed = prune(context, &paths).await;
    }
    {
        let mut cache = context.cache.lock().await;
        if !result.stopped_early {
            cache.mark_full_sync(now_epoch_ms());
        }
        context.persist(&mut cache).await;
    }

    result.duration_ms = elapsed_ms(started);
    finish(context, result);
    log.info(
        "sync.run.complete",
        "Full index run finished",
        Some(log_fields([
            ("runId", serde_json::Value::from(run_ctx.correlation_id().as_str())),
            ("indexed", serde_json::Value::from(result.indexed)),
            ("skipped", serde_json::Value::from(result.skipped)),
            ("failed", serde_json::Value::from(result.failed)),
            ("removed", serde_json::Value::from(result.removed)),
            ("stoppedEarly", serde_json::Value::from(result.stopped_early)),
            ("durationMs", serde_json::Value::from(result.duration_ms)),
        ])),
    );
    Ok(result)
}

/// Drop cache entries for documents that are gone or no longer indexable.
async fn prune(context: &SyncContext, paths: &[DocumentPath]) -> u64 {
    let listed: HashSet<&DocumentPath> = paths.iter().collect();
    let stale: Vec<DocumentPath> = context
        .cache
        .lock()
        .await
        .entries()
        .keys()
        .filter(|path| !listed.contains(path) || !context.documents.should_index(path))
        .cloned()
        .collect();
    let mut removed = 0;
    for path in &stale {
        if context.remove_document(path).await {
            removed += 1;
        }
    }
    removed
}

fn finish(context: &SyncContext, result: IndexResult) {
    context.state.apply(&RunEvent::WorkFinished);
    context.emit(ProgressEvent::RunCompleted { result });
}
