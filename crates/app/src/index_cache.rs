//! Durable map of indexed documents.
//!
//! The cache is the source of truth for "already indexed and unchanged". It
//! is loaded once, mutated by the engine's own tasks, and persisted after
//! each batch through a [`CacheStorePort`] that guarantees atomic replace.

use crate::log::EngineLog;
use std::collections::BTreeMap;
use std::sync::Arc;
use vault_sync_domain::{DocumentPath, IndexCacheRecord, IndexedEntry, StoreId};
use vault_sync_ports::{CacheStorePort, LogLevel, log_fields};
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};

/// In-memory index cache bound to its persistent store.
pub struct IndexCache {
    store: Arc<dyn CacheStorePort>,
    record: IndexCacheRecord,
    dirty: bool,
}

impl IndexCache {
    /// Empty cache stamped with `schema_version`.
    pub fn empty(store: Arc<dyn CacheStorePort>, schema_version: &str) -> Self {
        Self {
            store,
            record: IndexCacheRecord::empty(schema_version),
            dirty: false,
        }
    }

    /// Load the persisted record.
    ///
    /// A missing or unparsable record yields an empty cache. A record with a
    /// different schema version keeps only its store id. Read failures of
    /// the backing store are returned as errors.
    pub async fn load(
        ctx: &RequestContext,
        store: Arc<dyn CacheStorePort>,
        schema_version: &str,
    ) -> Result<Self> {
        Self::load_logged(ctx, store, schema_version, &EngineLog::default()).await
    }

    pub(crate) async fn load_logged(
        ctx: &RequestContext,
        store: Arc<dyn CacheStorePort>,
        schema_version: &str,
        log: &EngineLog,
    ) -> Result<Self> {
        let Some(bytes) = store.load(ctx).await? else {
            log.debug(
                "sync.cache.missing",
                "No index cache found, starting empty",
                Some(log_fields([("location", store.describe().as_ref())])),
            );
            return Ok(Self::empty(store, schema_version));
        };

        let record = match serde_json::from_slice::<IndexCacheRecord>(&bytes) {
            Ok(record) => record,
            Err(error) => {
                let envelope = ErrorEnvelope::expected(
                    ErrorCode::new("cache", "corrupt"),
                    format!("index cache is unreadable: {error}"),
                );
                log.failure(
                    LogLevel::Warn,
                    "sync.cache.corrupt",
                    "Index cache unreadable, starting empty",
                    Some(log_fields([("location", store.describe().as_ref())])),
                    &envelope,
                );
                let mut cache = Self::empty(store, schema_version);
                cache.dirty = true;
                return Ok(cache);
            },
        };

        if record.schema_version.as_ref() != schema_version {
            log.warn(
                "sync.cache.schema_mismatch",
                "Index cache schema changed, discarding entries",
                Some(log_fields([
                    ("found", record.schema_version.as_ref()),
                    ("expected", schema_version),
                ])),
            );
            return Ok(Self {
                store,
                record: record.rebuilt_for(schema_version),
                dirty: true,
            });
        }

        Ok(Self {
            store,
            record,
            dirty: false,
        })
    }

    /// Entry recorded for `path`.
    #[must_use]
    pub fn entry_for(&self, path: &DocumentPath) -> Option<&IndexedEntry> {
        self.record.entries.get(path)
    }

    /// Insert or replace the entry for `entry.path`.
    pub fn upsert(&mut self, entry: IndexedEntry) {
        self.record.entries.insert(entry.path.clone(), entry);
        self.dirty = true;
    }

    /// Remove the entry for `path`, returning it.
    pub fn remove(&mut self, path: &DocumentPath) -> Option<IndexedEntry> {
        let removed = self.record.entries.remove(path);
        self.dirty |= removed.is_some();
        removed
    }

    /// Write the record if it changed since the last persist.
    pub async fn persist(&mut self, ctx: &RequestContext) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(&self.record).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("cache", "serialize_failed"),
                format!("failed to serialize index cache: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
        self.store.store(ctx, bytes).await?;
        self.dirty = false;
        Ok(())
    }

    /// Remote store the entries belong to.
    #[must_use]
    pub const fn store_id(&self) -> Option<&StoreId> {
        self.record.store_id.as_ref()
    }

    /// Bind the cache to `store_id`.
    ///
    /// Entries recorded against a different store are discarded; returns the
    /// number of entries dropped.
    pub fn bind_store(&mut self, store_id: StoreId) -> usize {
        if self.record.store_id.as_ref() == Some(&store_id) {
            return 0;
        }
        let dropped = if self.record.store_id.is_some() {
            let count = self.record.entries.len();
            self.record.entries.clear();
            self.record.last_full_sync_ms = None;
            count
        } else {
            0
        };
        self.record.store_id = Some(store_id);
        self.dirty = true;
        dropped
    }

    /// Record the completion time of a full pass.
    pub fn mark_full_sync(&mut self, at_ms: u64) {
        self.record.last_full_sync_ms = Some(at_ms);
        self.dirty = true;
    }

    /// Completion time of the last full pass.
    #[must_use]
    pub const fn last_full_sync_ms(&self) -> Option<u64> {
        self.record.last_full_sync_ms
    }

    /// Indexed entries keyed by path.
    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<DocumentPath, IndexedEntry> {
        &self.record.entries
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.record.entries.len()
    }

    /// True when nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record.entries.is_empty()
    }

    /// True when in-memory state differs from the last persisted record.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Borrow the whole record.
    #[must_use]
    pub const fn record(&self) -> &IndexCacheRecord {
        &self.record
    }
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IndexCache")
            .field("location", &self.store.describe())
            .field("schema_version", &self.record.schema_version)
            .field("entries", &self.record.entries.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
