//! Sync engine facade.
//!
//! [`Engine`] owns the shared sync state, the single-flight run controller,
//! and a pump task. The pump records store events into the change queue and
//! starts flushes when the debounce deadline or a rate-limit cooldown ends.

use crate::change_queue::ChangeQueue;
use crate::content_hasher::ContentHasher;
use crate::index_cache::IndexCache;
use crate::log::EngineLog;
use crate::rate_limit::{RateLimitGuard, RunStateCell};
use crate::retry::RetryingUploader;
use crate::run_controller::IndexRunController;
use crate::sync_context::SyncContext;
use crate::upload_pipeline::{UploadPipeline, UploadSettings};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use vault_sync_domain::{
    DocumentEvent, FailureLog, FingerprintStrategy, IndexResult, IndexTreeNode, ProgressEvent,
    RunEvent, RunState, StoreName, SyncStatus,
};
use vault_sync_ports::{
    CacheStorePort, DocumentStorePort, IndexProviderPort, LogLevel, LoggerPort, log_fields,
};
use vault_sync_shared::{
    CorrelationId, RequestContext, Result, RetryPolicy, now_epoch_ms, retry_async,
};

const PROGRESS_CAPACITY: usize = 256;

/// Ports the engine runs against.
pub struct EngineDeps {
    /// Vault documents.
    pub documents: Arc<dyn DocumentStorePort>,
    /// Remote index provider.
    pub provider: Arc<dyn IndexProviderPort>,
    /// Persistent location of the index cache.
    pub cache_store: Arc<dyn CacheStorePort>,
    /// Structured logger; `None` disables engine logging.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Display name of the remote store.
    pub store_name: StoreName,
    /// Change detection strategy.
    pub fingerprint_strategy: FingerprintStrategy,
    /// Persist the cache after this many uploads during a full run.
    pub persist_every: u32,
    /// Failure records kept for status.
    pub failure_log_capacity: u32,
    /// Quiet period before queued changes are flushed.
    pub debounce: Duration,
    /// Upload admission and polling.
    pub upload: UploadSettings,
    /// Transient failure retries.
    pub retry: RetryPolicy,
    /// Minimum pause after a provider rate limit.
    pub cooldown: Duration,
}

impl EngineSettings {
    /// Defaults for a store named `store_name`.
    #[must_use]
    pub fn new(store_name: StoreName) -> Self {
        Self {
            store_name,
            fingerprint_strategy: FingerprintStrategy::default(),
            persist_every: 50,
            failure_log_capacity: 50,
            debounce: Duration::from_secs(2),
            upload: UploadSettings::default(),
            retry: RetryPolicy::default(),
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Keeps a remote index in sync with a local vault.
pub struct Engine {
    context: Arc<SyncContext>,
    runs: IndexRunController,
    cache_store: Arc<dyn CacheStorePort>,
    store_name: StoreName,
    retry: RetryPolicy,
    events: mpsc::UnboundedSender<DocumentEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<DocumentEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Wire an engine. It stays `disabled` until [`Engine::initialize`].
    #[must_use]
    pub fn new(deps: EngineDeps, settings: EngineSettings) -> Self {
        let log = EngineLog::new(deps.logger);
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        let hasher = ContentHasher::new(settings.fingerprint_strategy);
        let pipeline = UploadPipeline::new(deps.provider, settings.upload)
            .with_log(log.child("upload"));
        let uploader =
            RetryingUploader::new(pipeline, settings.retry).with_log(log.child("upload"));
        let cache = IndexCache::empty(Arc::clone(&deps.cache_store), &hasher.schema_version());

        let context = Arc::new(SyncContext {
            documents: deps.documents,
            hasher,
            uploader,
            cache: tokio::sync::Mutex::new(cache),
            queue: Mutex::new(ChangeQueue::new(settings.debounce)),
            failures: Mutex::new(FailureLog::with_capacity(
                usize::try_from(settings.failure_log_capacity).unwrap_or(usize::MAX),
            )),
            state: RunStateCell::new(RunState::Disabled, progress.clone()),
            guard: RateLimitGuard::new(settings.cooldown).with_log(log.child("rate_limit")),
            progress,
            work_lock: tokio::sync::Mutex::new(()),
            persist_every: usize::try_from(settings.persist_every.max(1)).unwrap_or(1),
            lifetime: RequestContext::new(CorrelationId::new_request_id()),
            wake: Notify::new(),
            flush_requested: AtomicBool::new(false),
            log: log.child("engine"),
        });

        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            runs: IndexRunController::new(Arc::clone(&context)),
            context,
            cache_store: deps.cache_store,
            store_name: settings.store_name,
            retry: settings.retry,
            events,
            receiver: Mutex::new(Some(receiver)),
            pump: Mutex::new(None),
        }
    }

    /// Load the cache, reconcile it with the remote store, and go `idle`.
    ///
    /// Entries recorded against a different store are discarded. On failure
    /// the engine enters `error` and the call may be repeated.
    pub async fn initialize(&self) -> Result<()> {
        let context = &self.context;
        context.lifetime.ensure_not_cancelled("engine.initialize")?;
        if !matches!(
            context.state.current(),
            RunState::Disabled | RunState::Error { .. }
        ) {
            return Ok(());
        }

        if let Err(error) = self.reconcile().await {
            context.log.failure(
                LogLevel::Error,
                "sync.engine.init_failed",
                "Engine initialization failed",
                None,
                &error,
            );
            context.state.apply(&RunEvent::Fail {
                reason: error.message.as_str().into(),
            });
            return Err(error);
        }

        context.state.apply(&RunEvent::Initialized);
        self.start_pump();
        context.log.info("sync.engine.ready", "Engine initialized", None);
        Ok(())
    }

    async fn reconcile(&self) -> Result<()> {
        let context = &self.context;
        let ctx = &context.lifetime;
        let schema = context.hasher.schema_version();
        let mut cache = IndexCache::load_logged(
            ctx,
            Arc::clone(&self.cache_store),
            &schema,
            &context.log,
        )
        .await?;

        let provider = context.uploader.pipeline().provider()?;
        let store_id = retry_async(ctx, self.retry, "engine.ensure_store", || {
            provider.ensure_store(ctx, self.store_name.clone())
        })
        .await?;
        let dropped = cache.bind_store(store_id.clone());
        if dropped > 0 {
            context.log.warn(
                "sync.store.reconciled",
                "Remote store changed, cached entries discarded",
                Some(log_fields([
                    ("storeId", serde_json::Value::from(store_id.as_str())),
                    ("droppedEntries", serde_json::Value::from(dropped)),
                ])),
            );
        }
        context.persist(&mut cache).await;
        *context.cache.lock().await = cache;
        Ok(())
    }

    fn start_pump(&self) {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = receiver else {
            return;
        };
        let handle = tokio::spawn(pump(Arc::clone(&self.context), receiver));
        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Sender for raw document store events.
    ///
    /// Events sent before initialization are buffered.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::UnboundedSender<DocumentEvent> {
        self.events.clone()
    }

    /// Current status snapshot.
    pub async fn get_status(&self) -> SyncStatus {
        let (indexed_count, last_full_sync_ms) = {
            let cache = self.context.cache.lock().await;
            (to_u64(cache.len()), cache.last_full_sync_ms())
        };
        let (failed_count, recent_failures) = {
            let failures = self.context.failures();
            (to_u64(failures.len()), failures.recent())
        };
        SyncStatus {
            state: self.context.state.current(),
            indexed_count,
            pending_count: to_u64(self.context.queue().len()),
            failed_count,
            last_full_sync_ms,
            recent_failures,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.context.state.current()
    }

    /// Receiver for progress events. Slow receivers may observe lag.
    #[must_use]
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.context.progress.subscribe()
    }

    /// Receiver that always holds the latest state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.context.state.subscribe()
    }

    /// Run a full pass, or join the one in flight.
    pub async fn run_full_index(&self) -> Result<IndexResult> {
        self.runs.run_full_index().await
    }

    /// True while a full run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runs.is_running()
    }

    /// Stop the active full run after its current document.
    pub fn cancel_run(&self) -> bool {
        let cancelled = self.runs.cancel();
        if cancelled {
            self.context
                .log
                .info("sync.run.cancel_requested", "Full run cancellation requested", None);
        }
        cancelled
    }

    /// Suspend uploads. Changes keep being recorded but are not flushed.
    pub fn pause(&self) -> bool {
        if self.context.state.apply(&RunEvent::Pause).is_none() {
            return false;
        }
        self.context.queue().disarm();
        self.context.wake.notify_one();
        self.context.log.info("sync.engine.paused", "Engine paused", None);
        true
    }

    /// Leave `paused` and flush whatever was recorded meanwhile.
    pub fn resume(&self) -> bool {
        if self.context.state.apply(&RunEvent::Resume).is_none() {
            return false;
        }
        self.context.log.info(
            "sync.engine.resumed",
            "Engine resumed",
            Some(log_fields([("pending", self.context.queue().len())])),
        );
        self.context.request_flush();
        true
    }

    /// Flush queued changes now, skipping the debounce.
    ///
    /// Waits for a full run in flight. Returns false when nothing was
    /// flushed because the queue is empty or the engine cannot upload.
    pub async fn sync_pending_now(&self) -> bool {
        if self.context.queue().is_empty() || !self.context.state.accepts_work() {
            return false;
        }
        self.context.flush_pending().await
    }

    /// Tree of vault documents annotated with their index entries.
    pub async fn index_tree(&self) -> Result<IndexTreeNode> {
        let paths = self
            .context
            .documents
            .enumerate(&RequestContext::new_request())
            .await?;
        let cache = self.context.cache.lock().await;
        Ok(IndexTreeNode::build(&paths, cache.entries()))
    }

    /// Stop all work, persist the cache, release the provider client, and go
    /// `disabled` for good.
    ///
    /// In-flight provider calls are abandoned; the affected documents stay
    /// unindexed and are picked up by the next run.
    pub async fn shutdown(&self) -> Result<()> {
        let context = &self.context;
        if context.lifetime.is_cancelled() {
            return Ok(());
        }
        context.state.apply(&RunEvent::Shutdown);
        self.runs.cancel();
        context.lifetime.cancel();
        context.wake.notify_one();

        let persisted = {
            let _work = context.work_lock.lock().await;
            context.queue().clear();
            context.guard.reset();
            let mut cache = context.cache.lock().await;
            cache.persist(&RequestContext::new_request()).await
        };

        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = pump
            && let Err(error) = pump.await
        {
            context.log.warn(
                "sync.engine.pump_failed",
                "Event pump ended abnormally",
                Some(log_fields([("error", error.to_string())])),
            );
        }
        context.uploader.pipeline().release_provider();
        context.log.info("sync.engine.shutdown", "Engine shut down", None);
        persisted
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Engine")
            .field("store_name", &self.store_name)
            .field("context", &self.context)
            .field("runs", &self.runs)
            .finish_non_exhaustive()
    }
}

fn to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn spawn_flush(context: &Arc<SyncContext>) {
    let context = Arc::clone(context);
    tokio::spawn(async move {
        context.flush_pending().await;
    });
}

fn record_event(context: &SyncContext, event: DocumentEvent) {
    let arm = !context.state.is_paused();
    let documents = &context.documents;
    context
        .queue()
        .enqueue(event, |path| documents.should_index(path), now_epoch_ms(), arm);
}

async fn pump(context: Arc<SyncContext>, mut events: mpsc::UnboundedReceiver<DocumentEvent>) {
    let mut open = true;
    loop {
        if context.take_flush_request() {
            spawn_flush(&context);
        }
        let deadline = context.queue().deadline();
        let cooldown = context.guard.resume_at();
        tokio::select! {
            () = context.lifetime.cancelled() => break,
            event = events.recv(), if open => match event {
                Some(event) => record_event(&context, event),
                None => open = false,
            },
            () = sleep_until(deadline) => {
                let due = {
                    let mut queue = context.queue();
                    let due = queue.is_due(Instant::now());
                    if due {
                        queue.disarm();
                    }
                    due
                };
                if due {
                    spawn_flush(&context);
                }
            },
            () = sleep_until(cooldown) => {
                if context.guard.release_if_elapsed(&context.state, Instant::now())
                    && !context.queue().is_empty()
                {
                    spawn_flush(&context);
                }
            },
            () = context.wake.notified() => {},
        }
    }
}
