//! In-memory adapter implementations for port contracts.
//!
//! These implementations are intended for:
//! - Engine unit/integration tests (deterministic, no network, no disk)
//! - Scripting provider failures (transient, rate limited, terminal)
//! - Driving change events without a real filesystem watcher

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use vault_sync_domain::{
    DocumentEvent, DocumentPath, OperationHandle, RemoteResourceId, StoreId, StoreName,
};
use vault_sync_ports::{
    BoxFuture, CacheStorePort, DocumentContent, DocumentStat, DocumentStorePort,
    IndexProviderPort, LogEvent, LogFields, LoggerPort, OperationStatus, UploadRequest,
};
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// Logger capturing every event; children share the buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base_fields: LogFields,
}

impl RecordingLogger {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of recorded events, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event.into_string())
            .collect()
    }

    /// True when an event with `name` was logged.
    pub fn has_event(&self, name: &str) -> bool {
        self.events().iter().any(|event| event.event.as_ref() == name)
    }
}

impl LoggerPort for RecordingLogger {
    fn log(&self, mut event: LogEvent) {
        if !self.base_fields.is_empty() {
            let mut fields = self.base_fields.clone();
            fields.extend(event.fields.unwrap_or_default());
            event.fields = Some(fields);
        }
        self.events.lock().unwrap().push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base_fields = self.base_fields.clone();
        base_fields.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base_fields,
        })
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    content: DocumentContent,
    modified_ms: u64,
}

/// Document store over an in-memory map, with an optional event channel.
///
/// Mutations made through [`put_text`](Self::put_text),
/// [`remove`](Self::remove) and [`rename`](Self::rename) are pushed to the
/// connected sender as [`DocumentEvent`]s, the same way the filesystem
/// watcher reports them.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    documents: Mutex<BTreeMap<DocumentPath, StoredDocument>>,
    extensions: Vec<String>,
    events: Mutex<Option<UnboundedSender<DocumentEvent>>>,
    clock_ms: AtomicU64,
    enumerate_delay: Mutex<Option<Duration>>,
    enumerate_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Store indexing `md`, `markdown`, `txt` and `pdf`.
    pub fn new() -> Self {
        Self::with_extensions(["md", "markdown", "txt", "pdf"])
    }

    /// Store indexing only the given extensions.
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            documents: Mutex::new(BTreeMap::new()),
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().to_ascii_lowercase())
                .collect(),
            events: Mutex::new(None),
            clock_ms: AtomicU64::new(1_700_000_000_000),
            enumerate_delay: Mutex::new(None),
            enumerate_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
        }
    }

    /// Route subsequent mutations to `sender`.
    pub fn connect(&self, sender: UnboundedSender<DocumentEvent>) {
        *self.events.lock().unwrap() = Some(sender);
    }

    /// Make `enumerate` wait before returning (uses tokio time).
    pub fn set_enumerate_delay(&self, delay: Duration) {
        *self.enumerate_delay.lock().unwrap() = Some(delay);
    }

    /// Seed a document without emitting an event.
    pub fn seed(&self, path: &str, text: &str) {
        self.insert(path, DocumentContent::Text(text.into()));
    }

    /// Create or overwrite a text document and emit `Created`/`Modified`.
    pub fn put_text(&self, path: &str, text: &str) {
        self.put_content(path, DocumentContent::Text(text.into()));
    }

    /// Create or overwrite a document and emit `Created`/`Modified`.
    pub fn put_content(&self, path: &str, content: DocumentContent) {
        let existed = self.insert(path, content);
        let path = parse(path);
        self.emit(if existed {
            DocumentEvent::Modified { path }
        } else {
            DocumentEvent::Created { path }
        });
    }

    /// Remove a document and emit `Deleted`.
    pub fn remove(&self, path: &str) {
        let path = parse(path);
        self.documents.lock().unwrap().remove(&path);
        self.emit(DocumentEvent::Deleted { path });
    }

    /// Move a document and emit `Renamed`.
    pub fn rename(&self, from: &str, to: &str) {
        let old_path = parse(from);
        let path = parse(to);
        {
            let mut documents = self.documents.lock().unwrap();
            if let Some(document) = documents.remove(&old_path) {
                documents.insert(path.clone(), document);
            }
        }
        self.emit(DocumentEvent::Renamed { path, old_path });
    }

    /// Emit an arbitrary event without touching the documents.
    pub fn emit(&self, event: DocumentEvent) {
        if let Some(sender) = self.events.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Number of `enumerate` calls so far.
    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    /// Number of `read` calls so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn insert(&self, path: &str, content: DocumentContent) -> bool {
        let modified_ms = self.clock_ms.fetch_add(1_000, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .insert(
                parse(path),
                StoredDocument {
                    content,
                    modified_ms,
                },
            )
            .is_some()
    }

    fn get(&self, path: &DocumentPath) -> Result<StoredDocument> {
        self.documents
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                ErrorEnvelope::expected(ErrorCode::not_found(), "document not found")
                    .with_metadata("path", path.as_str())
            })
    }
}

impl DocumentStorePort for InMemoryDocumentStore {
    fn enumerate(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<DocumentPath>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.enumerate_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            ctx.ensure_not_cancelled("in_memory_store.enumerate")?;
            Ok(self
                .documents
                .lock()
                .unwrap()
                .keys()
                .filter(|path| self.should_index(path))
                .cloned()
                .collect())
        })
    }

    fn read(
        &self,
        ctx: &RequestContext,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<DocumentContent>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_store.read")?;
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.get(&path)?.content)
        })
    }

    fn stat(&self, ctx: &RequestContext, path: DocumentPath) -> BoxFuture<'_, Result<DocumentStat>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_store.stat")?;
            let document = self.get(&path)?;
            Ok(DocumentStat {
                size_bytes: document.content.len() as u64,
                modified_ms: document.modified_ms,
            })
        })
    }

    fn should_index(&self, path: &DocumentPath) -> bool {
        let hidden = path.segments().any(|segment| segment.starts_with('.'));
        !hidden
            && path
                .extension()
                .is_some_and(|extension| self.extensions.contains(&extension))
    }
}

fn parse(path: &str) -> DocumentPath {
    DocumentPath::parse(path).expect("test document path")
}

/// Scripted outcome of one `upload` call.
#[derive(Debug, Clone)]
pub enum ScriptedUpload {
    /// Accept; the operation completes on the first poll.
    Accept,
    /// Accept; the operation reports pending for `n` polls first.
    AcceptAfterPolls(u32),
    /// Accept; the operation never completes.
    NeverCompletes,
    /// Accept; the operation completes with this error.
    OperationFails(ErrorEnvelope),
    /// Reject the upload call itself.
    Fail(ErrorEnvelope),
}

/// One recorded upload call.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    /// Target store.
    pub store_id: StoreId,
    /// Uploaded path.
    pub path: DocumentPath,
    /// Uploaded body.
    pub content: DocumentContent,
    /// Tokio time of the call.
    pub at: Instant,
}

#[derive(Debug)]
enum OperationPlan {
    Succeed {
        pending_polls: u32,
        resource_id: RemoteResourceId,
    },
    Fail(ErrorEnvelope),
    Never,
}

#[derive(Debug, Default)]
struct ProviderState {
    stores: BTreeMap<String, StoreId>,
    ensure_store_error: Option<ErrorEnvelope>,
    ensure_store_calls: usize,
    script: VecDeque<ScriptedUpload>,
    path_scripts: HashMap<DocumentPath, VecDeque<ScriptedUpload>>,
    always_fail: HashMap<DocumentPath, ErrorEnvelope>,
    uploads: Vec<UploadRecord>,
    operations: HashMap<OperationHandle, OperationPlan>,
    polls: usize,
    deleted_stores: Vec<StoreId>,
    next_id: u64,
}

/// Index provider double with scriptable outcomes.
///
/// Outcomes are taken, in order of precedence, from the permanent failure
/// table, the per-path script, the global script, and finally `Accept`.
#[derive(Debug, Default)]
pub struct ScriptedIndexProvider {
    state: Mutex<ProviderState>,
}

impl ScriptedIndexProvider {
    /// Provider that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register an existing remote store.
    pub fn with_existing_store(self, name: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .stores
            .insert(name.to_owned(), StoreId::parse(id).expect("store id"));
        self
    }

    /// Make `ensure_store` fail with `error` until cleared.
    pub fn fail_ensure_store(&self, error: Option<ErrorEnvelope>) {
        self.state.lock().unwrap().ensure_store_error = error;
    }

    /// Queue an outcome for the next upload of any path.
    pub fn script_upload(&self, outcome: ScriptedUpload) {
        self.state.lock().unwrap().script.push_back(outcome);
    }

    /// Queue an outcome for the next upload of `path`.
    pub fn script_upload_for(&self, path: &str, outcome: ScriptedUpload) {
        self.state
            .lock()
            .unwrap()
            .path_scripts
            .entry(parse(path))
            .or_default()
            .push_back(outcome);
    }

    /// Fail every upload of `path` with `error`.
    pub fn always_fail(&self, path: &str, error: ErrorEnvelope) {
        self.state.lock().unwrap().always_fail.insert(parse(path), error);
    }

    /// All recorded upload calls.
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Total upload calls.
    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    /// Upload calls for one path.
    pub fn uploads_for(&self, path: &str) -> usize {
        let path = parse(path);
        self.state
            .lock()
            .unwrap()
            .uploads
            .iter()
            .filter(|record| record.path == path)
            .count()
    }

    /// Total `poll_operation` calls.
    pub fn poll_count(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    /// Total `ensure_store` calls.
    pub fn ensure_store_calls(&self) -> usize {
        self.state.lock().unwrap().ensure_store_calls
    }

    /// Stores removed through `delete_store`.
    pub fn deleted_stores(&self) -> Vec<StoreId> {
        self.state.lock().unwrap().deleted_stores.clone()
    }
}

impl ProviderState {
    fn next_outcome(&mut self, path: &DocumentPath) -> ScriptedUpload {
        if let Some(error) = self.always_fail.get(path) {
            return ScriptedUpload::Fail(error.clone());
        }
        if let Some(outcome) = self.path_scripts.get_mut(path).and_then(VecDeque::pop_front) {
            return outcome;
        }
        self.script.pop_front().unwrap_or(ScriptedUpload::Accept)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl IndexProviderPort for ScriptedIndexProvider {
    fn ensure_store(&self, ctx: &RequestContext, name: StoreName) -> BoxFuture<'_, Result<StoreId>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("scripted_provider.ensure_store")?;
            let mut state = self.state.lock().unwrap();
            state.ensure_store_calls += 1;
            if let Some(error) = state.ensure_store_error.clone() {
                return Err(error);
            }
            if let Some(existing) = state.stores.get(name.as_str()) {
                return Ok(existing.clone());
            }
            let id = state.next_id();
            let store_id = StoreId::parse(format!("stores/{id}")).expect("store id");
            state.stores.insert(name.as_str().to_owned(), store_id.clone());
            Ok(store_id)
        })
    }

    fn upload(
        &self,
        ctx: &RequestContext,
        request: UploadRequest,
    ) -> BoxFuture<'_, Result<OperationHandle>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("scripted_provider.upload")?;
            let mut state = self.state.lock().unwrap();
            state.uploads.push(UploadRecord {
                store_id: request.store_id.clone(),
                path: request.path.clone(),
                content: request.content.clone(),
                at: Instant::now(),
            });
            let outcome = state.next_outcome(&request.path);
            let id = state.next_id();
            let plan = match outcome {
                ScriptedUpload::Fail(error) => return Err(error),
                ScriptedUpload::Accept => OperationPlan::Succeed {
                    pending_polls: 0,
                    resource_id: RemoteResourceId::parse(format!("docs/{id}")).expect("id"),
                },
                ScriptedUpload::AcceptAfterPolls(pending_polls) => OperationPlan::Succeed {
                    pending_polls,
                    resource_id: RemoteResourceId::parse(format!("docs/{id}")).expect("id"),
                },
                ScriptedUpload::NeverCompletes => OperationPlan::Never,
                ScriptedUpload::OperationFails(error) => OperationPlan::Fail(error),
            };
            let handle = OperationHandle::parse(format!("operations/{id}")).expect("handle");
            state.operations.insert(handle.clone(), plan);
            Ok(handle)
        })
    }

    fn poll_operation(
        &self,
        ctx: &RequestContext,
        handle: OperationHandle,
    ) -> BoxFuture<'_, Result<OperationStatus>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("scripted_provider.poll_operation")?;
            let mut state = self.state.lock().unwrap();
            state.polls += 1;
            let Some(plan) = state.operations.get_mut(&handle) else {
                return Err(ErrorEnvelope::unexpected(
                    ErrorCode::not_found(),
                    "unknown operation",
                    ErrorClass::NonRetriable,
                ));
            };
            Ok(match plan {
                OperationPlan::Never => OperationStatus::pending(),
                OperationPlan::Fail(error) => OperationStatus::failed(error.clone()),
                OperationPlan::Succeed {
                    pending_polls,
                    resource_id,
                } => {
                    if *pending_polls > 0 {
                        *pending_polls -= 1;
                        OperationStatus::pending()
                    } else {
                        OperationStatus::succeeded(resource_id.clone())
                    }
                },
            })
        })
    }

    fn delete_store(&self, ctx: &RequestContext, store_id: StoreId) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("scripted_provider.delete_store")?;
            let mut state = self.state.lock().unwrap();
            state.stores.retain(|_, id| *id != store_id);
            state.deleted_stores.push(store_id);
            Ok(())
        })
    }
}

/// Cache store holding the serialized record in memory.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    bytes: Mutex<Option<Vec<u8>>>,
    fail_stores: Mutex<Option<ErrorEnvelope>>,
    store_calls: AtomicUsize,
}

impl InMemoryCacheStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `bytes`.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::default();
        *store.bytes.lock().unwrap() = Some(bytes.into());
        store
    }

    /// Current bytes.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().clone()
    }

    /// Current bytes parsed as JSON.
    pub fn contents_json(&self) -> Option<serde_json::Value> {
        self.contents()
            .map(|bytes| serde_json::from_slice(&bytes).expect("cache json"))
    }

    /// Make `store` fail with `error` until cleared.
    pub fn fail_stores(&self, error: Option<ErrorEnvelope>) {
        *self.fail_stores.lock().unwrap() = error;
    }

    /// Number of successful `store` calls.
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }
}

impl CacheStorePort for InMemoryCacheStore {
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Option<Vec<u8>>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_cache.load")?;
            Ok(self.contents())
        })
    }

    fn store(&self, _ctx: &RequestContext, bytes: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(error) = self.fail_stores.lock().unwrap().clone() {
                return Err(error);
            }
            *self.bytes.lock().unwrap() = Some(bytes);
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn describe(&self) -> Box<str> {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::transient_error;

    #[tokio::test]
    async fn document_store_emits_events_for_mutations() {
        let store = InMemoryDocumentStore::new();
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        store.seed("a.md", "seeded");
        store.connect(sender);

        store.put_text("a.md", "changed");
        store.put_text("b.md", "new");
        store.rename("b.md", "c.md");
        store.remove("a.md");

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                DocumentEvent::Modified { path: parse("a.md") },
                DocumentEvent::Created { path: parse("b.md") },
                DocumentEvent::Renamed {
                    path: parse("c.md"),
                    old_path: parse("b.md"),
                },
                DocumentEvent::Deleted { path: parse("a.md") },
            ]
        );

        let listed = store.enumerate(&RequestContext::new_request()).await.unwrap();
        assert_eq!(listed, vec![parse("c.md")]);
    }

    #[tokio::test]
    async fn should_index_skips_hidden_and_foreign_extensions() {
        let store = InMemoryDocumentStore::with_extensions(["md"]);
        assert!(store.should_index(&parse("notes/a.md")));
        assert!(!store.should_index(&parse("notes/a.txt")));
        assert!(!store.should_index(&parse(".vault-sync/a.md")));
    }

    #[tokio::test]
    async fn provider_follows_scripts_in_precedence_order() {
        let provider = ScriptedIndexProvider::new();
        let ctx = RequestContext::new_request();
        let store_id = provider
            .ensure_store(&ctx, StoreName::parse("vault").unwrap())
            .await
            .unwrap();
        provider.script_upload(ScriptedUpload::Fail(transient_error()));
        provider.script_upload_for("b.md", ScriptedUpload::AcceptAfterPolls(1));

        let request = |path: &str| UploadRequest {
            store_id: store_id.clone(),
            path: parse(path),
            content: DocumentContent::Text("body".into()),
            metadata: BTreeMap::new(),
        };

        let handle = provider.upload(&ctx, request("b.md")).await.unwrap();
        assert!(!provider.poll_operation(&ctx, handle.clone()).await.unwrap().done);
        assert!(provider.poll_operation(&ctx, handle).await.unwrap().done);

        assert!(provider.upload(&ctx, request("a.md")).await.is_err());
        assert!(provider.upload(&ctx, request("a.md")).await.is_ok());
        assert_eq!(provider.uploads_for("a.md"), 2);
        assert_eq!(provider.poll_count(), 2);
    }

    #[tokio::test]
    async fn cache_store_round_trips_bytes() {
        let cache = InMemoryCacheStore::new();
        let ctx = RequestContext::new_request();
        assert_eq!(cache.load(&ctx).await.unwrap(), None);
        cache.store(&ctx, b"{}".to_vec()).await.unwrap();
        assert_eq!(cache.load(&ctx).await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(cache.store_calls(), 1);
    }

    #[test]
    fn recording_logger_children_share_buffer() {
        let logger = RecordingLogger::new();
        let child = logger.child(vault_sync_ports::log_fields([("component", "queue")]));
        child.info("sync.queue.flush", "flushing", None);
        assert!(logger.has_event("sync.queue.flush"));
        let fields = logger.events()[0].fields.clone().unwrap();
        assert_eq!(fields.get("component"), Some(&serde_json::json!("queue")));
    }
}
