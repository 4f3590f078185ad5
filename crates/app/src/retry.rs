//! Failure classification and bounded retries around the upload pipeline.

use crate::log::EngineLog;
use crate::upload_pipeline::{UploadOutcome, UploadPipeline, is_operation_timeout};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use vault_sync_domain::{DocumentPath, FailureKind, Fingerprint, RemoteResourceId, StoreId};
use vault_sync_ports::{DocumentContent, LogLevel, log_fields, provider_error};
use vault_sync_shared::{
    ErrorEnvelope, RequestContext, Result, RetryDecision, RetryPolicy, retry_async_with_observer,
};

/// Classify an upload failure.
///
/// Cancellation is not a failure and must be handled before calling this.
#[must_use]
pub fn classify_failure(error: &ErrorEnvelope) -> FailureKind {
    if provider_error::is_rate_limited(error) {
        FailureKind::RateLimited
    } else if is_operation_timeout(error) {
        FailureKind::Timeout
    } else if provider_error::is_auth(error) || !error.class.is_retriable() {
        FailureKind::Terminal
    } else {
        FailureKind::Transient
    }
}

/// Final result of an upload including its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAttempt {
    /// Uploaded after `attempts` calls.
    Uploaded {
        /// Provider id of the document.
        resource_id: RemoteResourceId,
        /// Upload calls made, including the successful one.
        attempts: u32,
    },
    /// Not uploaded because of the minimum-size filter.
    BelowMinimumSize,
    /// Gave up.
    Failed {
        /// Last error.
        error: ErrorEnvelope,
        /// Classification of the last error.
        kind: FailureKind,
        /// Upload calls made.
        attempts: u32,
    },
}

/// Retries transient upload failures on a fixed backoff schedule.
///
/// Terminal failures and timeouts return immediately. Rate limits also
/// return immediately so the engine-wide guard can suspend all work; they
/// never consume the retry budget.
#[derive(Debug)]
pub struct RetryingUploader {
    pipeline: UploadPipeline,
    policy: RetryPolicy,
    log: EngineLog,
}

impl RetryingUploader {
    /// Wrap `pipeline` with `policy`.
    pub fn new(pipeline: UploadPipeline, policy: RetryPolicy) -> Self {
        Self {
            pipeline,
            policy,
            log: EngineLog::default(),
        }
    }

    pub(crate) fn with_log(mut self, log: EngineLog) -> Self {
        self.log = log;
        self
    }

    /// Underlying pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &UploadPipeline {
        &self.pipeline
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Upload with retries.
    ///
    /// Returns `Err` only when `ctx` is cancelled; every other failure is
    /// reported as [`UploadAttempt::Failed`].
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        store_id: &StoreId,
        path: &DocumentPath,
        content: &DocumentContent,
        fingerprint: &Fingerprint,
    ) -> Result<UploadAttempt> {
        let attempts = AtomicU32::new(0);
        let mut op = || {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.pipeline
                .upload(ctx, store_id, path, content.clone(), fingerprint)
        };
        let outcome = retry_async_with_observer(
            ctx,
            self.policy,
            "upload.retry",
            &mut op,
            |error| match classify_failure(error) {
                FailureKind::Transient => RetryDecision::Retry,
                FailureKind::RateLimited | FailureKind::Terminal | FailureKind::Timeout => {
                    RetryDecision::GiveUp
                },
            },
            |retry, error, delay: Duration| {
                self.log.failure(
                    LogLevel::Warn,
                    "sync.upload.retry",
                    "Transient upload failure, retrying",
                    Some(log_fields([
                        ("path", serde_json::Value::from(path.as_str())),
                        ("retry", serde_json::Value::from(retry)),
                        (
                            "delayMs",
                            serde_json::Value::from(
                                u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            ),
                        ),
                    ])),
                    error,
                );
            },
        )
        .await;

        match outcome {
            Ok(UploadOutcome::Uploaded(resource_id)) => Ok(UploadAttempt::Uploaded {
                resource_id,
                attempts: attempts.load(Ordering::Relaxed),
            }),
            Ok(UploadOutcome::BelowMinimumSize) => Ok(UploadAttempt::BelowMinimumSize),
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => Ok(UploadAttempt::Failed {
                kind: classify_failure(&error),
                error,
                attempts: attempts.load(Ordering::Relaxed),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload_pipeline::UploadSettings;
    use std::sync::Arc;
    use vault_sync_testkit::errors::{
        auth_error, invalid_request_error, malformed_response_error, rate_limited_error,
        transient_error,
    };
    use vault_sync_testkit::in_memory::{ScriptedIndexProvider, ScriptedUpload};

    const BODY: &str = "A note long enough to pass the admission filter.";

    fn uploader(provider: Arc<ScriptedIndexProvider>) -> RetryingUploader {
        RetryingUploader::new(
            UploadPipeline::new(provider, UploadSettings::default()),
            RetryPolicy::default(),
        )
    }

    async fn upload(uploader: &RetryingUploader, ctx: &RequestContext) -> Result<UploadAttempt> {
        let content = DocumentContent::Text(BODY.into());
        uploader
            .upload(
                ctx,
                &StoreId::parse("stores/1")?,
                &DocumentPath::parse("a.md")?,
                &content,
                &Fingerprint::digest(content.as_bytes()),
            )
            .await
    }

    #[test]
    fn taxonomy() {
        assert_eq!(classify_failure(&transient_error()), FailureKind::Transient);
        assert_eq!(classify_failure(&malformed_response_error()), FailureKind::Transient);
        assert_eq!(classify_failure(&rate_limited_error(None)), FailureKind::RateLimited);
        assert_eq!(classify_failure(&auth_error()), FailureKind::Terminal);
        assert_eq!(classify_failure(&invalid_request_error()), FailureKind::Terminal);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_follow_the_fixed_schedule() -> Result<()> {
        let provider = Arc::new(ScriptedIndexProvider::new());
        provider.always_fail("a.md", transient_error());
        let uploader = uploader(provider.clone());

        let attempt = upload(&uploader, &RequestContext::new_request()).await?;
        let UploadAttempt::Failed { kind, attempts, .. } = attempt else {
            panic!("expected failure, got {attempt:?}");
        };
        assert_eq!(kind, FailureKind::Transient);
        assert_eq!(attempts, 4);

        let times: Vec<_> = provider.uploads().iter().map(|record| record.at).collect();
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|pair| u64::try_from((pair[1] - pair[0]).as_millis()).unwrap_or(u64::MAX))
            .collect();
        assert_eq!(gaps, vec![1_000, 2_000, 4_000]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_a_transient_failure() -> Result<()> {
        let provider = Arc::new(ScriptedIndexProvider::new());
        provider.script_upload(ScriptedUpload::Fail(transient_error()));
        let uploader = uploader(provider.clone());

        let attempt = upload(&uploader, &RequestContext::new_request()).await?;
        assert!(matches!(attempt, UploadAttempt::Uploaded { attempts: 2, .. }));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_and_rate_limit_failures_do_not_retry() -> Result<()> {
        for error in [auth_error(), rate_limited_error(Some(Duration::from_secs(5)))] {
            let provider = Arc::new(ScriptedIndexProvider::new());
            provider.script_upload(ScriptedUpload::Fail(error));
            let uploader = uploader(provider.clone());

            let attempt = upload(&uploader, &RequestContext::new_request()).await?;
            assert!(matches!(attempt, UploadAttempt::Failed { attempts: 1, .. }));
            assert_eq!(provider.upload_count(), 1);
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_returned_as_error() {
        let provider = Arc::new(ScriptedIndexProvider::new());
        provider.always_fail("a.md", transient_error());
        let uploader = uploader(provider);
        let ctx = RequestContext::new_request();
        ctx.cancel();

        let error = upload(&uploader, &ctx).await.expect_err("cancelled");
        assert!(error.is_cancelled());
    }
}
