//! Optional retry decorator around [`Lookup`].
//!
//! The orchestrator itself makes a single attempt. [`RetryingLookup`] adds
//! bounded retries with jittered exponential backoff and a breaker that stops
//! calling the registry for a cool-down once it has rejected several attempts
//! in a row as automated traffic.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;

use super::events::{LookupEvent, RetryEvent};
use super::identifier::Identifier;
use super::pacing::Backoff;
use crate::config::RetryConfig;
use crate::lookup::{Lookup, LookupError, LookupOutcome};

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_blocks: u32,
    open_until: Option<Instant>,
}

/// Retry and circuit-breaking wrapper; cheap to share behind an `Arc`.
pub struct RetryingLookup {
    inner: Arc<Lookup>,
    config: RetryConfig,
    backoff: Backoff,
    breaker: Mutex<BreakerState>,
}

impl RetryingLookup {
    pub fn new(inner: Arc<Lookup>, config: RetryConfig) -> Self {
        let backoff = Backoff::new(config.base_delay, config.max_delay);
        Self {
            inner,
            config,
            backoff,
            breaker: Mutex::new(BreakerState::default()),
        }
    }

    /// Pass-through wrapper: one attempt, breaker disabled.
    pub fn single_attempt(inner: Arc<Lookup>) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    pub fn inner(&self) -> &Arc<Lookup> {
        &self.inner
    }

    pub async fn lookup(&self, raw: &str) -> LookupOutcome {
        let identifier = Identifier::normalize(raw)?;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if let Some(retry_after) = self.open_for() {
                // Cached answers need no outbound call, so they stay available.
                return match self.inner.cached(identifier.as_str()).await? {
                    Some(result) => Ok(result),
                    None => Err(LookupError::CircuitOpen { retry_after }),
                };
            }

            let outcome = self.inner.lookup(identifier.as_str()).await;
            self.observe(&outcome);

            let err = match outcome {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            let retryable = matches!(err, LookupError::Blocked { .. } | LookupError::Upstream(_));
            if !retryable || attempt >= max_attempts {
                return Err(err);
            }

            let wait = self.backoff.delay_for(attempt);
            self.inner.events().dispatch(LookupEvent::Retry(RetryEvent {
                identifier: identifier.clone(),
                attempt: attempt + 1,
                reason: err.to_string(),
                scheduled_after: wait,
                timestamp: Utc::now(),
            }));
            sleep(wait).await;
        }
    }

    fn open_for(&self) -> Option<Duration> {
        let mut state = self.lock();
        let until = state.open_until?;
        let now = Instant::now();
        if now >= until {
            state.open_until = None;
            state.consecutive_blocks = 0;
            log::info!("registry breaker closed");
            return None;
        }
        Some(until - now)
    }

    fn observe(&self, outcome: &LookupOutcome) {
        let mut state = self.lock();
        match outcome {
            Err(LookupError::Blocked { .. }) => {
                state.consecutive_blocks = state.consecutive_blocks.saturating_add(1);
                let threshold = self.config.blocked_threshold;
                if threshold > 0 && state.consecutive_blocks >= threshold {
                    state.open_until = Some(Instant::now() + self.config.cooldown);
                    log::warn!(
                        "registry breaker open for {:.0}s after {} consecutive blocks",
                        self.config.cooldown.as_secs_f64(),
                        state.consecutive_blocks
                    );
                }
            }
            Ok(_) | Err(LookupError::Upstream(_)) => state.consecutive_blocks = 0,
            Err(_) => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.breaker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
