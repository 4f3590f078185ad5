//! Request-scoped context, cooperative cancellation, and single-flight joins.
//!
//! - `RequestContext` carries a correlation id and a `CancellationToken`
//!   across every port call.
//! - `SingleFlight` lets concurrent callers of the same operation share one
//!   spawned execution and its (cloned) result.

use crate::{ErrorClass, ErrorCode, ErrorEnvelope, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// A correlation identifier used for logging/telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier from user input.
    ///
    /// The value is trimmed; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlationId must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Create a new request id (`req_N`), unique within this process.
    #[must_use]
    pub fn new_request_id() -> Self {
        next_scoped_id(&REQUEST_ID_COUNTER, "req_")
    }

    /// Create a new run id (`run_N`), unique within this process.
    #[must_use]
    pub fn new_run_id() -> Self {
        next_scoped_id(&RUN_ID_COUNTER, "run_")
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_scoped_id(counter: &AtomicU64, prefix: &'static str) -> CorrelationId {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    CorrelationId(Arc::from(format!("{prefix}{n}")))
}

/// A clonable cancellation token that can be awaited.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancel the token and wake every waiter.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new request context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self::with_cancellation(correlation_id, CancellationToken::new())
    }

    /// Create a context with an auto-generated `req_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_request_id())
    }

    /// Create a context sharing an existing cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error when cancelled, including operation metadata.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}

type SharedFlight<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Flight<T> {
    id: u64,
    future: SharedFlight<T>,
}

/// Joins concurrent callers onto one in-flight execution.
///
/// The first caller spawns the work on the tokio runtime; later callers await
/// the same shared future and receive a clone of its result. The slot clears
/// itself when the work completes, so the next call starts a fresh execution.
/// Dropping a waiting caller never cancels the spawned work.
pub struct SingleFlight<T> {
    slot: Arc<Mutex<Option<Flight<T>>>>,
    next_id: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an idle single-flight slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns true while an execution is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Join the in-flight execution, or start one with `start`.
    ///
    /// Returns the shared future and whether this call started it.
    pub fn join_or_start<F>(&self, start: F) -> (SharedFlight<T>, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        let mut guard = lock_slot(&self.slot);
        if let Some(flight) = guard.as_ref() {
            return (flight.future.clone(), false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let work = start();
        let slot = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            let outcome = work.await;
            let mut guard = lock_slot(&slot);
            if guard.as_ref().is_some_and(|flight| flight.id == id) {
                *guard = None;
            }
            outcome
        });
        let future = async move {
            handle.await.unwrap_or_else(|error| {
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    format!("single-flight task failed: {error}"),
                    ErrorClass::NonRetriable,
                ))
            })
        }
        .boxed()
        .shared();

        *guard = Some(Flight {
            id,
            future: future.clone(),
        });
        (future, true)
    }

    /// Run `start` single-flight and await the shared result.
    pub async fn run<F>(&self, start: F) -> Result<T>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        let (future, _) = self.join_or_start(start);
        future.await
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SingleFlight")
            .field("running", &lock_slot(&self.slot).is_some())
            .finish()
    }
}

fn lock_slot<T>(slot: &Mutex<Option<Flight<T>>>) -> std::sync::MutexGuard<'_, Option<Flight<T>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
