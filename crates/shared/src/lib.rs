//! # vault-sync-shared
//!
//! Shared utilities, result types, and error handling for the vault-sync workspace.
//!
//! - `ErrorEnvelope` + `Result` used at every boundary
//! - `RequestContext` with cooperative cancellation
//! - `SingleFlight` joins for concurrent callers of one operation
//! - retry/backoff helpers with cancellable sleeps
//!
//! This crate has no workspace dependencies.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod concurrency;
pub mod errors;
pub mod redaction;
pub mod result;
pub mod retry;
pub mod time;

pub use concurrency::{CancellationToken, CorrelationId, RequestContext, SingleFlight};
pub use errors::{
    ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata, REDACTED_VALUE,
    RETRY_AFTER_MS_KEY, UnexpectedError, normalize_unexpected_error,
};
pub use redaction::{REDACTED, SecretString, is_secret_key};
pub use result::{Result, ResultExt};
pub use retry::{
    RetryDecision, RetryPolicy, retry_async, retry_async_with_observer, sleep_with_cancellation,
};
pub use time::now_epoch_ms;

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
