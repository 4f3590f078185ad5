//! Engine run state and rate-limit cooldown.

use crate::log::EngineLog;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use vault_sync_domain::{ProgressEvent, RunEvent, RunState};
use vault_sync_ports::log_fields;
use vault_sync_shared::{RequestContext, Result, now_epoch_ms, sleep_with_cancellation};

/// Owner of the engine-wide [`RunState`].
///
/// Every change goes through the domain transition table; accepted changes
/// are published on a watch channel and as [`ProgressEvent::State`].
#[derive(Debug)]
pub struct RunStateCell {
    state: watch::Sender<RunState>,
    progress: broadcast::Sender<ProgressEvent>,
}

impl RunStateCell {
    /// Cell starting in `initial`, publishing to `progress`.
    #[must_use]
    pub fn new(initial: RunState, progress: broadcast::Sender<ProgressEvent>) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state, progress }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Receiver observing every accepted state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Apply `event`; returns the new state when the transition applies.
    pub fn apply(&self, event: &RunEvent) -> Option<RunState> {
        let mut next = None;
        self.state.send_if_modified(|state| {
            let Some(candidate) = state.transition(event) else {
                return false;
            };
            let changed = *state != candidate;
            *state = candidate.clone();
            next = Some(candidate);
            changed
        });
        if let Some(state) = next.as_ref() {
            let _ = self.progress.send(ProgressEvent::state(state.clone()));
        }
        next
    }

    /// True when uploads may start.
    #[must_use]
    pub fn accepts_work(&self) -> bool {
        self.state.borrow().accepts_work()
    }

    /// True while the operator pause is active.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(*self.state.borrow(), RunState::Paused)
    }

    /// True when no further document may be submitted.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        matches!(
            *self.state.borrow(),
            RunState::Paused | RunState::Disabled | RunState::Error { .. }
        )
    }
}

/// Suspends all uploads for a cooldown after a provider rate limit.
#[derive(Debug)]
pub struct RateLimitGuard {
    cooldown: Duration,
    resume_at: Mutex<Option<Instant>>,
    log: EngineLog,
}

impl RateLimitGuard {
    /// Guard with the configured cooldown.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            resume_at: Mutex::new(None),
            log: EngineLog::default(),
        }
    }

    pub(crate) fn with_log(mut self, log: EngineLog) -> Self {
        self.log = log;
        self
    }

    /// Configured cooldown.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Start (or extend) a cooldown and move `state` to `rate_limited`.
    ///
    /// The window is the configured cooldown, stretched to the provider's
    /// retry hint when that is longer. Returns the resume time (epoch ms).
    pub fn trip(&self, state: &RunStateCell, retry_after: Option<Duration>) -> u64 {
        let window = retry_after.map_or(self.cooldown, |hint| hint.max(self.cooldown));
        let resume_at = Instant::now() + window;
        {
            let mut slot = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some((*slot).map_or(resume_at, |current| current.max(resume_at)));
        }
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let resume_at_ms = now_epoch_ms().saturating_add(window_ms);
        state.apply(&RunEvent::RateLimited { resume_at_ms });
        self.log.warn(
            "sync.rate_limit.enter",
            "Provider rate limit, suspending uploads",
            Some(log_fields([
                ("cooldownMs", window_ms),
                ("resumeAtMs", resume_at_ms),
            ])),
        );
        resume_at_ms
    }

    /// Instant the current cooldown ends, if one is active.
    #[must_use]
    pub fn resume_at(&self) -> Option<Instant> {
        *self.resume_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a cooldown is active at `now`.
    #[must_use]
    pub fn is_limited(&self, now: Instant) -> bool {
        self.resume_at().is_some_and(|resume_at| resume_at > now)
    }

    /// Clear an elapsed cooldown and leave `rate_limited`.
    ///
    /// Returns true when a cooldown was cleared.
    pub fn release_if_elapsed(&self, state: &RunStateCell, now: Instant) -> bool {
        {
            let mut slot = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
            match *slot {
                Some(resume_at) if resume_at <= now => *slot = None,
                _ => return false,
            }
        }
        state.apply(&RunEvent::CooldownElapsed);
        self.log.info("sync.rate_limit.exit", "Cooldown elapsed, resuming uploads", None);
        true
    }

    /// Sleep until the active cooldown ends, then release it.
    pub async fn wait(&self, ctx: &RequestContext, state: &RunStateCell) -> Result<()> {
        while let Some(resume_at) = self.resume_at() {
            let remaining = resume_at.saturating_duration_since(Instant::now());
            sleep_with_cancellation(ctx, remaining, "rate_limit.wait").await?;
            if self.release_if_elapsed(state, Instant::now()) {
                break;
            }
        }
        Ok(())
    }

    /// Forget any active cooldown without touching the state.
    pub fn reset(&self) {
        *self.resume_at.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
