//! Single-document upload with operation polling.

use crate::index_cache::IndexCache;
use crate::log::EngineLog;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use vault_sync_domain::{
    DocumentPath, Fingerprint, IndexedEntry, OperationHandle, RemoteResourceId, StoreId,
};
use vault_sync_ports::{
    DocumentContent, IndexProviderPort, OperationStatus, UploadRequest, log_fields, provider_error,
};
use vault_sync_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, sleep_with_cancellation,
};

/// Stable code for an operation that did not finish in time.
pub const OPERATION_TIMEOUT_CODE: (&str, &str) = ("upload", "operation_timeout");

/// Upload admission and polling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    /// Documents with fewer meaningful bytes are not uploaded.
    pub min_content_bytes: u64,
    /// First delay between operation polls.
    pub poll_initial: Duration,
    /// Ceiling for the poll delay.
    pub poll_max: Duration,
    /// Wall-clock bound for one operation, from submit to completion.
    pub operation_timeout: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            min_content_bytes: 32,
            poll_initial: Duration::from_secs(1),
            poll_max: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(120),
        }
    }
}

/// Result of a successful pipeline call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Uploaded; the provider reported this resource id.
    Uploaded(RemoteResourceId),
    /// Rejected by the minimum-size admission filter; nothing was sent.
    BelowMinimumSize,
}

/// Uploads one document and waits for the provider to finish importing it.
pub struct UploadPipeline {
    provider: Mutex<Option<Arc<dyn IndexProviderPort>>>,
    settings: UploadSettings,
    log: EngineLog,
}

impl UploadPipeline {
    /// Pipeline over `provider`.
    pub fn new(provider: Arc<dyn IndexProviderPort>, settings: UploadSettings) -> Self {
        Self {
            provider: Mutex::new(Some(provider)),
            settings,
            log: EngineLog::default(),
        }
    }

    pub(crate) fn with_log(mut self, log: EngineLog) -> Self {
        self.log = log;
        self
    }

    /// Provider client, or a cancellation error once released.
    pub(crate) fn provider(&self) -> Result<Arc<dyn IndexProviderPort>> {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ErrorEnvelope::cancelled("provider client released"))
    }

    /// Drop the provider client. Later uploads fail as cancelled.
    pub(crate) fn release_provider(&self) -> bool {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// True when `content` passes the minimum-size admission filter.
    #[must_use]
    pub fn admits(&self, content: &DocumentContent) -> bool {
        let meaningful = u64::try_from(content.meaningful_len()).unwrap_or(u64::MAX);
        meaningful >= self.settings.min_content_bytes
    }

    /// Submit `content` and poll the import to completion.
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        store_id: &StoreId,
        path: &DocumentPath,
        content: DocumentContent,
        fingerprint: &Fingerprint,
    ) -> Result<UploadOutcome> {
        if !self.admits(&content) {
            self.log.debug(
                "sync.upload.below_minimum",
                "Document below minimum size, not uploaded",
                Some(log_fields([
                    ("path", serde_json::Value::from(path.as_str())),
                    ("bytes", serde_json::Value::from(content.meaningful_len())),
                ])),
            );
            return Ok(UploadOutcome::BelowMinimumSize);
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("path".into(), path.as_str().into());
        metadata.insert("fingerprint".into(), fingerprint.as_str().into());
        let provider = self.provider()?;
        let handle = provider
            .upload(
                ctx,
                UploadRequest {
                    store_id: store_id.clone(),
                    path: path.clone(),
                    content,
                    metadata,
                },
            )
            .await?;

        let timeout = self.settings.operation_timeout;
        let polled = tokio::time::timeout(
            timeout,
            self.poll_until_done(ctx, provider.as_ref(), &handle),
        )
        .await;
        let Ok(status) = polled else {
            return Err(operation_timeout_error(path, &handle, timeout));
        };
        let status = status?;

        if let Some(error) = status.error {
            return Err(error.with_metadata("path", path.as_str()));
        }
        status.resource_id.map(UploadOutcome::Uploaded).ok_or_else(|| {
            provider_error::invalid_response("operation finished without a resource id")
                .with_metadata("path", path.as_str())
        })
    }

    async fn poll_until_done(
        &self,
        ctx: &RequestContext,
        provider: &dyn IndexProviderPort,
        handle: &OperationHandle,
    ) -> Result<OperationStatus> {
        let mut delay = self.settings.poll_initial;
        loop {
            sleep_with_cancellation(ctx, delay, "upload.poll").await?;
            let status = provider.poll_operation(ctx, handle.clone()).await?;
            if status.done {
                return Ok(status);
            }
            delay = delay.saturating_mul(2).min(self.settings.poll_max);
        }
    }

    /// Forget `path` locally.
    ///
    /// The provider has no per-document delete, so the uploaded copy stays
    /// in the remote store until the whole store is dropped.
    pub fn delete(&self, cache: &mut IndexCache, path: &DocumentPath) -> Option<IndexedEntry> {
        let removed = cache.remove(path)?;
        self.log.info(
            "sync.delete.remote_orphaned",
            "Removed document from the local index; remote copy is left in place",
            Some(log_fields([
                ("path", path.as_str()),
                ("remoteResourceId", removed.remote_resource_id.as_str()),
            ])),
        );
        Some(removed)
    }
}

impl std::fmt::Debug for UploadPipeline {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("UploadPipeline")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// True for the error produced when polling exceeds the operation bound.
#[must_use]
pub fn is_operation_timeout(error: &ErrorEnvelope) -> bool {
    error.code.is(OPERATION_TIMEOUT_CODE.0, OPERATION_TIMEOUT_CODE.1)
}

fn operation_timeout_error(
    path: &DocumentPath,
    handle: &OperationHandle,
    timeout: Duration,
) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new(OPERATION_TIMEOUT_CODE.0, OPERATION_TIMEOUT_CODE.1),
        format!("upload of {path} did not complete within {}ms", timeout.as_millis()),
        ErrorClass::NonRetriable,
    )
    .with_metadata("path", path.as_str())
    .with_metadata("operation", handle.as_str())
    .with_metadata("timeoutMs", timeout.as_millis().to_string())
}
