//! Lookup event hooks.
//!
//! The orchestrator reports each phase as a [`LookupEvent`]; handlers turn
//! them into log lines or counters.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::audit::AuditSource;
use super::identifier::Identifier;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub identifier: Identifier,
    pub hit: bool,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of the session warm-up request.
#[derive(Debug, Clone)]
pub struct WarmUpEvent {
    pub identifier: Identifier,
    pub egress: String,
    pub fingerprint: &'static str,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub identifier: Identifier,
    pub egress: String,
    pub fingerprint: &'static str,
    pub status: Option<u16>,
    pub paced_delay: Duration,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub identifier: Identifier,
    pub blocked: bool,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub identifier: Identifier,
    pub source: AuditSource,
    pub written: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub identifier: Identifier,
    pub attempt: u32,
    pub reason: String,
    pub scheduled_after: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum LookupEvent {
    Cache(CacheEvent),
    WarmUp(WarmUpEvent),
    Query(QueryEvent),
    Failure(FailureEvent),
    Audit(AuditEvent),
    Retry(RetryEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &LookupEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: LookupEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &LookupEvent) {
        match event {
            LookupEvent::Cache(cache) => {
                let verdict = if cache.hit { "hit" } else { "miss" };
                log::debug!("cache {verdict} for {}", cache.identifier);
            }
            LookupEvent::WarmUp(warm) => match (&warm.status, &warm.error) {
                (_, Some(error)) => log::warn!(
                    "warm-up for {} via {} ({}) failed, continuing: {}",
                    warm.identifier,
                    warm.egress,
                    warm.fingerprint,
                    error
                ),
                (Some(status), None) => log::debug!(
                    "warm-up for {} via {} ({}) -> {} ({:.2}s)",
                    warm.identifier,
                    warm.egress,
                    warm.fingerprint,
                    status,
                    warm.latency.as_secs_f64()
                ),
                (None, None) => {}
            },
            LookupEvent::Query(query) => {
                log::debug!(
                    "query {} via {} ({}) after {:.2}s pause -> {:?} ({:.2}s)",
                    query.identifier,
                    query.egress,
                    query.fingerprint,
                    query.paced_delay.as_secs_f64(),
                    query.status,
                    query.latency.as_secs_f64()
                );
            }
            LookupEvent::Failure(failure) => {
                if failure.blocked {
                    log::warn!("lookup {} blocked: {}", failure.identifier, failure.error);
                } else {
                    log::warn!("lookup {} failed: {}", failure.identifier, failure.error);
                }
            }
            LookupEvent::Audit(audit) => {
                if audit.written {
                    log::info!("audited {} ({})", audit.identifier, audit.source);
                }
            }
            LookupEvent::Retry(retry) => {
                log::info!(
                    "retry {} attempt {} after {:.2}s ({})",
                    retry.identifier,
                    retry.attempt,
                    retry.scheduled_after.as_secs_f64(),
                    retry.reason
                );
            }
        }
    }
}

/// Point-in-time copy of [`LookupStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub warm_up_failures: u64,
    pub queries: u64,
    pub blocked: u64,
    pub upstream_errors: u64,
    pub audited: u64,
    pub retries: u64,
}

/// Lock-free outcome counters.
#[derive(Debug, Default)]
pub struct LookupStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    warm_up_failures: AtomicU64,
    queries: AtomicU64,
    blocked: AtomicU64,
    upstream_errors: AtomicU64,
    audited: AtomicU64,
    retries: AtomicU64,
}

impl LookupStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            warm_up_failures: self.warm_up_failures.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            audited: self.audited.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

impl EventHandler for LookupStats {
    fn handle(&self, event: &LookupEvent) {
        let counter = match event {
            LookupEvent::Cache(cache) if cache.hit => &self.cache_hits,
            LookupEvent::Cache(_) => &self.cache_misses,
            LookupEvent::WarmUp(warm) if warm.error.is_some() => &self.warm_up_failures,
            LookupEvent::WarmUp(_) => return,
            LookupEvent::Query(_) => &self.queries,
            LookupEvent::Failure(failure) if failure.blocked => &self.blocked,
            LookupEvent::Failure(_) => &self.upstream_errors,
            LookupEvent::Audit(audit) if audit.written => &self.audited,
            LookupEvent::Audit(_) => return,
            LookupEvent::Retry(_) => &self.retries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
