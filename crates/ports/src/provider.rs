//! Remote index provider boundary contract and its error taxonomy.

use crate::{BoxFuture, DocumentContent};
use std::collections::BTreeMap;
use std::time::Duration;
use vault_sync_domain::{DocumentPath, OperationHandle, RemoteResourceId, StoreId, StoreName};
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};

/// One document upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Target store.
    pub store_id: StoreId,
    /// Vault-relative path, also used as display name.
    pub path: DocumentPath,
    /// Document body.
    pub content: DocumentContent,
    /// Custom metadata forwarded to the provider.
    pub metadata: BTreeMap<Box<str>, Box<str>>,
}

/// Poll result of an asynchronous provider operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    /// True once the operation finished (successfully or not).
    pub done: bool,
    /// Resource id of the uploaded document, when done and successful.
    pub resource_id: Option<RemoteResourceId>,
    /// Failure reported by the provider, when done and failed.
    pub error: Option<ErrorEnvelope>,
}

impl OperationStatus {
    /// Operation still running.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            done: false,
            resource_id: None,
            error: None,
        }
    }

    /// Operation finished with a resource id.
    #[must_use]
    pub const fn succeeded(resource_id: RemoteResourceId) -> Self {
        Self {
            done: true,
            resource_id: Some(resource_id),
            error: None,
        }
    }

    /// Operation finished with an error.
    #[must_use]
    pub const fn failed(error: ErrorEnvelope) -> Self {
        Self {
            done: true,
            resource_id: None,
            error: Some(error),
        }
    }
}

/// Boundary contract for the remote semantic-search store.
///
/// There is deliberately no per-document delete: the provider cannot remove
/// single documents, so local deletes leave an orphaned remote record.
pub trait IndexProviderPort: Send + Sync {
    /// Find the store named `name`, creating it when absent.
    fn ensure_store(&self, ctx: &RequestContext, name: StoreName) -> BoxFuture<'_, Result<StoreId>>;

    /// Submit a document; returns the handle of the async import operation.
    fn upload(
        &self,
        ctx: &RequestContext,
        request: UploadRequest,
    ) -> BoxFuture<'_, Result<OperationHandle>>;

    /// Check an async operation once.
    fn poll_operation(
        &self,
        ctx: &RequestContext,
        handle: OperationHandle,
    ) -> BoxFuture<'_, Result<OperationStatus>>;

    /// Delete a whole store and everything in it.
    fn delete_store(&self, ctx: &RequestContext, store_id: StoreId) -> BoxFuture<'_, Result<()>>;
}

/// Namespace of provider error codes.
pub const PROVIDER_NAMESPACE: &str = "provider";

/// Constructors for the provider error taxonomy.
pub mod provider_error {
    use super::{Duration, ErrorClass, ErrorCode, ErrorEnvelope, PROVIDER_NAMESPACE};

    /// `provider:rate_limited` code.
    pub const RATE_LIMITED: &str = "rate_limited";
    /// `provider:auth` code.
    pub const AUTH: &str = "auth";
    /// `provider:invalid_request` code.
    pub const INVALID_REQUEST: &str = "invalid_request";
    /// `provider:unavailable` code.
    pub const UNAVAILABLE: &str = "unavailable";
    /// `provider:timeout` code.
    pub const TIMEOUT: &str = "timeout";
    /// `provider:connection` code.
    pub const CONNECTION: &str = "connection";
    /// `provider:invalid_response` code.
    pub const INVALID_RESPONSE: &str = "invalid_response";
    /// `provider:operation_failed` code.
    pub const OPERATION_FAILED: &str = "operation_failed";

    fn code(code: &str) -> ErrorCode {
        ErrorCode::new(PROVIDER_NAMESPACE, code)
    }

    /// Rate limit signal, optionally with the provider's retry hint.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> ErrorEnvelope {
        let error = ErrorEnvelope::expected_with_class(
            code(RATE_LIMITED),
            message,
            ErrorClass::Retriable,
        );
        match retry_after {
            Some(delay) => error.with_retry_after(delay),
            None => error,
        }
    }

    /// Credentials rejected.
    pub fn auth(message: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope::expected(code(AUTH), message)
    }

    /// Request permanently rejected.
    pub fn invalid_request(message: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope::expected(code(INVALID_REQUEST), message)
    }

    /// Provider-side outage.
    pub fn unavailable(message: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope::unexpected(code(UNAVAILABLE), message, ErrorClass::Retriable)
    }

    /// Request or gateway timeout.
    pub fn timeout(message: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope::unexpected(code(TIMEOUT), message, ErrorClass::Retriable)
    }

    /// Transport failure before a response arrived.
    pub fn connection(message: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope::unexpected(code(CONNECTION), message, ErrorClass::Retriable)
    }

    /// Malformed or partial response body.
    pub fn invalid_response(message: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope::unexpected(code(INVALID_RESPONSE), message, ErrorClass::Retriable)
    }

    /// The async operation finished with an error.
    pub fn operation_failed(message: impl Into<String>, class: ErrorClass) -> ErrorEnvelope {
        ErrorEnvelope::unexpected(code(OPERATION_FAILED), message, class)
    }

    /// True for `provider:rate_limited`.
    #[must_use]
    pub fn is_rate_limited(error: &ErrorEnvelope) -> bool {
        error.code.is(PROVIDER_NAMESPACE, RATE_LIMITED)
    }

    /// True for `provider:auth`.
    #[must_use]
    pub fn is_auth(error: &ErrorEnvelope) -> bool {
        error.code.is(PROVIDER_NAMESPACE, AUTH)
    }
}
