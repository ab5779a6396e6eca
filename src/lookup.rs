//! Lookup orchestration.
//!
//! Runs one resolution of a citizen identifier:
//!
//! ```text
//! CacheCheck ─hit──────────────────────────────────────────────► Done (cache)
//!     └─miss─► WarmUp ─► PacedDelay ─► AuthoritativeQuery ─► Classify
//!                                            success ─► StoreAndAudit ─► Done (live)
//!                                            failure ─► ReportError
//! ```
//!
//! Every call performs at most one outbound attempt. Retrying is left to the
//! caller or to [`crate::modules::retry::RetryingLookup`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER};
use http::Method;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;

use crate::config::{ConfigError, LookupConfig};
use crate::modules::audit::{AuditSink, AuditSource, MemoryAuditLog, extract_display_name};
use crate::modules::cache::ResultCache;
use crate::modules::evasion::{EvasionProfile, EvasionProfileSelector};
use crate::modules::events::{
    AuditEvent, CacheEvent, EventDispatcher, EventHandler, FailureEvent, LoggingHandler,
    LookupEvent, QueryEvent, WarmUpEvent,
};
use crate::modules::identifier::{Identifier, IdentifierError};
use crate::transport::{
    RegistryRequest, RegistryResponse, RegistryTransport, ReqwestTransport, TransportError,
};

/// Request field carrying the identifier.
pub const QUERY_FIELD: &str = "numeroCedula";

const BODY_PREVIEW_CHARS: usize = 500;

/// Result alias used across the orchestration layer.
pub type LookupOutcome = Result<LookupResult, LookupError>;

/// Why the upstream registry did not produce a usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamFailure {
    #[error("registry answered with status {0}")]
    Status(u16),
    #[error("registry request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed registry body: {0}")]
    MalformedBody(String),
}

/// Typed failure surfaced to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),
    #[error("blocked by bot mitigation (status {status})")]
    Blocked { status: u16 },
    #[error("upstream registry error: {0}")]
    Upstream(UpstreamFailure),
    #[error("lookups suspended after repeated blocks; retry in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },
}

impl LookupError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, LookupError::Blocked { .. })
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, LookupError::Upstream(_))
    }
}

/// Where a successful payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Live,
    Cache,
}

impl From<LookupSource> for AuditSource {
    fn from(source: LookupSource) -> Self {
        match source {
            LookupSource::Live => AuditSource::Live,
            LookupSource::Cache => AuditSource::Cache,
        }
    }
}

/// Successful resolution. `payload` is the registry JSON, untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub identifier: Identifier,
    pub payload: Value,
    pub display_name: String,
    pub source: LookupSource,
    pub expires_at: DateTime<Utc>,
}

/// Maps a raw transport outcome onto the lookup taxonomy.
pub fn classify(outcome: Result<RegistryResponse, TransportError>) -> Result<Value, LookupError> {
    let response = match outcome {
        Ok(response) => response,
        Err(TransportError::Timeout) => {
            return Err(LookupError::Upstream(UpstreamFailure::Timeout));
        }
        Err(err) => {
            return Err(LookupError::Upstream(UpstreamFailure::Transport(err.to_string())));
        }
    };

    match response.status {
        200 => serde_json::from_slice::<Value>(&response.body).map_err(|err| {
            LookupError::Upstream(UpstreamFailure::MalformedBody(err.to_string()))
        }),
        403 => Err(LookupError::Blocked { status: 403 }),
        status => Err(LookupError::Upstream(UpstreamFailure::Status(status))),
    }
}

/// Fluent builder for [`Lookup`].
pub struct LookupBuilder {
    config: LookupConfig,
    transport: Option<Arc<dyn RegistryTransport>>,
    audit: Option<Arc<dyn AuditSink>>,
    cache: Option<ResultCache>,
    handlers: Vec<Arc<dyn EventHandler>>,
    log_events: bool,
}

impl LookupBuilder {
    pub fn new() -> Self {
        Self {
            config: LookupConfig::default(),
            transport: None,
            audit: None,
            cache: None,
            handlers: Vec::new(),
            log_events: true,
        }
    }

    pub fn with_config(mut self, config: LookupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn RegistryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Shares an existing cache instead of creating one from the config TTL.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn disable_event_logging(mut self) -> Self {
        self.log_events = false;
        self
    }

    pub fn build(self) -> Result<Lookup, ConfigError> {
        let selector = self.config.selector()?;
        if !selector.has_egress() {
            log::info!("no egress pool configured; using direct connections");
        }

        let mut events = EventDispatcher::new();
        if self.log_events {
            events.register_handler(Arc::new(LoggingHandler));
        }
        for handler in self.handlers {
            events.register_handler(handler);
        }

        let cache = self
            .cache
            .unwrap_or_else(|| ResultCache::new(self.config.cache_ttl));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(MemoryAuditLog::new()));

        Ok(Lookup {
            config: self.config,
            selector,
            cache,
            audit,
            transport,
            events,
        })
    }
}

impl Default for LookupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Main lookup orchestrator. Share it behind an `Arc`; every method takes `&self`.
pub struct Lookup {
    config: LookupConfig,
    selector: EvasionProfileSelector,
    cache: ResultCache,
    audit: Arc<dyn AuditSink>,
    transport: Arc<dyn RegistryTransport>,
    events: EventDispatcher,
}

impl Lookup {
    pub fn builder() -> LookupBuilder {
        LookupBuilder::new()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub(crate) fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Seeds the audit dedup set. Call once before serving.
    pub async fn load_audit(&self) -> usize {
        self.audit.load_known_identifiers().await.len()
    }

    /// Resolves `raw` (hyphens and surrounding whitespace allowed).
    pub async fn lookup(&self, raw: &str) -> LookupOutcome {
        let identifier = Identifier::normalize(raw)?;

        if let Some(result) = self.cache_check(&identifier).await {
            return Ok(result);
        }

        let profile = self.selector.choose();
        self.warm_up(&identifier, &profile).await;

        let paced_delay = self.config.delay.sample();
        if paced_delay > Duration::ZERO {
            sleep(paced_delay).await;
        }

        let payload = match self.query(&identifier, &profile, paced_delay).await {
            Ok(payload) => payload,
            Err(err) => {
                self.events.dispatch(LookupEvent::Failure(FailureEvent {
                    identifier: identifier.clone(),
                    blocked: err.is_blocked(),
                    error: err.to_string(),
                    timestamp: Utc::now(),
                }));
                return Err(err);
            }
        };

        let entry = self.cache.put(identifier.clone(), payload);
        let display_name = extract_display_name(&entry.payload);
        self.audit_resolution(&identifier, &display_name, LookupSource::Live)
            .await;

        Ok(LookupResult {
            identifier,
            payload: entry.payload,
            display_name,
            source: LookupSource::Live,
            expires_at: entry.expires_at,
        })
    }

    /// Cache-only resolution: never touches the network.
    pub async fn cached(&self, raw: &str) -> Result<Option<LookupResult>, LookupError> {
        let identifier = Identifier::normalize(raw)?;
        Ok(self.cache_check(&identifier).await)
    }

    async fn cache_check(&self, identifier: &Identifier) -> Option<LookupResult> {
        let Some(entry) = self.cache.get(identifier) else {
            self.dispatch_cache(identifier, false);
            return None;
        };
        self.dispatch_cache(identifier, true);

        let display_name = extract_display_name(&entry.payload);
        self.audit_resolution(identifier, &display_name, LookupSource::Cache)
            .await;
        Some(LookupResult {
            identifier: entry.identifier,
            payload: entry.payload,
            display_name,
            source: LookupSource::Cache,
            expires_at: entry.expires_at,
        })
    }

    async fn warm_up(&self, identifier: &Identifier, profile: &EvasionProfile) {
        let request = RegistryRequest::new(
            Method::GET,
            self.config.warmup_url.clone(),
            profile.clone(),
            self.config.warmup_timeout,
        )
        .with_headers(profile.fingerprint.headers());

        let started = Instant::now();
        let outcome = self.transport.send(request).await;
        let latency = started.elapsed();

        let (status, error) = match outcome {
            Ok(response) if (200..400).contains(&response.status) => (Some(response.status), None),
            Ok(response) => (
                Some(response.status),
                Some(format!("status {}", response.status)),
            ),
            Err(err) => (None, Some(err.to_string())),
        };

        self.events.dispatch(LookupEvent::WarmUp(WarmUpEvent {
            identifier: identifier.clone(),
            egress: profile.egress_label(),
            fingerprint: profile.fingerprint.as_str(),
            status,
            error,
            latency,
            timestamp: Utc::now(),
        }));
    }

    async fn query(
        &self,
        identifier: &Identifier,
        profile: &EvasionProfile,
        paced_delay: Duration,
    ) -> Result<Value, LookupError> {
        let body = serde_json::json!({ QUERY_FIELD: identifier.as_str() }).to_string();
        let request = RegistryRequest::new(
            Method::POST,
            self.config.query_url.clone(),
            profile.clone(),
            self.config.query_timeout,
        )
        .with_headers(self.query_headers(profile))
        .with_body(body);

        let started = Instant::now();
        let outcome = self.transport.send(request).await;
        let latency = started.elapsed();

        self.events.dispatch(LookupEvent::Query(QueryEvent {
            identifier: identifier.clone(),
            egress: profile.egress_label(),
            fingerprint: profile.fingerprint.as_str(),
            status: outcome.as_ref().ok().map(|response| response.status),
            paced_delay,
            latency,
            timestamp: Utc::now(),
        }));

        if let Ok(response) = &outcome
            && response.status != 200
        {
            log::debug!(
                "registry body for {identifier} (status {}): {}",
                response.status,
                response.body_preview(BODY_PREVIEW_CHARS)
            );
        }

        classify(outcome)
    }

    fn query_headers(&self, profile: &EvasionProfile) -> HeaderMap {
        let mut headers = profile.fingerprint.headers();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        if let Ok(referer) = HeaderValue::from_str(self.config.warmup_url.as_str()) {
            headers.insert(REFERER, referer);
        }
        let origin = self.config.warmup_url.origin().ascii_serialization();
        if let Ok(origin) = HeaderValue::from_str(&origin) {
            headers.insert(ORIGIN, origin);
        }
        headers
    }

    async fn audit_resolution(
        &self,
        identifier: &Identifier,
        display_name: &str,
        source: LookupSource,
    ) {
        let source = AuditSource::from(source);
        let written = self
            .audit
            .record_if_new(identifier, display_name, source)
            .await;
        self.events.dispatch(LookupEvent::Audit(AuditEvent {
            identifier: identifier.clone(),
            source,
            written,
            timestamp: Utc::now(),
        }));
    }

    fn dispatch_cache(&self, identifier: &Identifier, hit: bool) {
        self.events.dispatch(LookupEvent::Cache(CacheEvent {
            identifier: identifier.clone(),
            hit,
            timestamp: Utc::now(),
        }));
    }
}
