//! # vault-sync-app
//!
//! Sync engine: change detection, debounced change queue, upload pipeline
//! with retries and rate-limit cooldowns, and single-flight full runs.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod change_queue;
pub mod content_hasher;
pub mod engine;
pub mod index_cache;
mod log;
pub mod rate_limit;
pub mod retry;
pub mod run_controller;
mod sync_context;
pub mod upload_pipeline;

pub use change_queue::ChangeQueue;
pub use content_hasher::{ContentHasher, HashedDocument};
pub use engine::{Engine, EngineDeps, EngineSettings};
pub use index_cache::IndexCache;
pub use rate_limit::{RateLimitGuard, RunStateCell};
pub use retry::{RetryingUploader, UploadAttempt, classify_failure};
pub use run_controller::IndexRunController;
pub use upload_pipeline::{
    OPERATION_TIMEOUT_CODE, UploadOutcome, UploadPipeline, UploadSettings, is_operation_timeout,
};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
