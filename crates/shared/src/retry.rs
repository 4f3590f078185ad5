//! Bounded exponential backoff.
//!
//! The policy is expressed as "retries after the first attempt"; with the
//! default values the delays form the fixed 1s, 2s, 4s schedule.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter ratio as percentage (0..=100).
    pub jitter_ratio_pct: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 4_000,
            jitter_ratio_pct: 0,
        }
    }
}

impl RetryPolicy {
    /// Total attempts including the first one.
    #[must_use]
    pub const fn max_attempts(self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for_retry(self, retry: u32) -> Duration {
        backoff_delay(self, retry, jitter_seed(retry))
    }
}

/// What a retry loop should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back off and try again, consuming one retry.
    Retry,
    /// Stop and return the error.
    GiveUp,
}

/// Retry a fallible async operation while its error class is retriable.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(
        ctx,
        policy,
        operation,
        &mut op,
        |error| {
            if error.class.is_retriable() {
                RetryDecision::Retry
            } else {
                RetryDecision::GiveUp
            }
        },
        |_, _, _| {},
    )
    .await
}

/// Retry with a caller-supplied classifier and a callback per scheduled retry.
///
/// `on_retry` receives the 1-based retry number, the failure, and the delay
/// that is about to be slept.
pub async fn retry_async_with_observer<T, F, Fut, Classify, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    classify: Classify,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Classify: Fn(&ErrorEnvelope) -> RetryDecision,
    Obs: FnMut(u32, &ErrorEnvelope, Duration),
{
    let mut retries = 0u32;

    loop {
        ctx.ensure_not_cancelled(operation)?;

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if error.is_cancelled()
            || retries >= policy.max_retries
            || classify(&error) == RetryDecision::GiveUp
        {
            return Err(error);
        }

        retries = retries.saturating_add(1);
        let delay = policy.delay_for_retry(retries);
        on_retry(retries, &error, delay);
        sleep_with_cancellation(ctx, delay, operation).await?;
    }
}

/// Sleep for `delay` unless the context is cancelled first.
pub async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(
            ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
        ),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn backoff_delay(policy: RetryPolicy, retry: u32, seed: u64) -> Duration {
    let pow = retry.saturating_sub(1).min(30);
    let capped = policy
        .base_delay_ms
        .saturating_mul(1u64 << pow)
        .min(policy.max_delay_ms);
    let jitter_pct = u64::from(policy.jitter_ratio_pct.min(100));
    if jitter_pct == 0 {
        return Duration::from_millis(capped);
    }

    // Spread symmetrically in [-range, +range], then clamp to the cap.
    let range = capped.saturating_mul(jitter_pct) / 100;
    let span = range.saturating_mul(2).saturating_add(1);
    let offset = seed % span;
    let jittered = capped
        .saturating_sub(range)
        .saturating_add(offset)
        .min(policy.max_delay_ms);
    Duration::from_millis(jittered)
}

fn jitter_seed(retry: u32) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::from(duration.subsec_nanos()));
    nanos ^ u64::from(retry).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
