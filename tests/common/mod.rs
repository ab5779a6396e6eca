#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cedula_lookup::modules::DelayWindow;
use cedula_lookup::{
    AuditSink, Lookup, LookupConfig, MemoryAuditLog, RegistryRequest, RegistryResponse,
    RegistryTransport, TransportError,
};
use http::{HeaderMap, Method};

pub type Scripted = Result<(u16, String), TransportError>;

/// Transport double: answers from per-method scripts and records every request.
#[derive(Default)]
pub struct MockTransport {
    warm_ups: Mutex<VecDeque<Scripted>>,
    queries: Mutex<VecDeque<Scripted>>,
    query_fallback: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<RegistryRequest>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_warm_up(&self, outcome: Scripted) -> &Self {
        self.warm_ups.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_query(&self, outcome: Scripted) -> &Self {
        self.queries.lock().unwrap().push_back(outcome);
        self
    }

    /// Answer used once the query script is exhausted.
    pub fn always_query(&self, outcome: Scripted) -> &Self {
        *self.query_fallback.lock().unwrap() = Some(outcome);
        self
    }

    pub fn requests(&self) -> Vec<RegistryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method)
            .count()
    }

    pub fn queries(&self) -> Vec<RegistryRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == Method::POST)
            .collect()
    }
}

#[async_trait]
impl RegistryTransport for MockTransport {
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse, TransportError> {
        let url = request.url.clone();
        let method = request.method.clone();
        self.requests.lock().unwrap().push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = if method == Method::GET {
            self.warm_ups
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok((200, "<html>ok</html>".to_string())))
        } else {
            let next = self.queries.lock().unwrap().pop_front();
            next.or_else(|| self.query_fallback.lock().unwrap().clone())
                .unwrap_or_else(|| Ok((500, "no script".to_string())))
        };

        scripted.map(|(status, body)| RegistryResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body),
            url,
        })
    }
}

pub fn ok_json(body: &str) -> Scripted {
    Ok((200, body.to_string()))
}

pub fn status(code: u16) -> Scripted {
    Ok((code, format!("<html>{code}</html>")))
}

pub const JANE: &str = r#"{"d":{"nombreCompleto":"Jane Doe","centro":"Escuela Central"}}"#;

/// Lookup wired to the given doubles with pacing disabled.
pub fn lookup_with(
    transport: Arc<MockTransport>,
    audit: Arc<dyn AuditSink>,
    config: LookupConfig,
) -> Lookup {
    Lookup::builder()
        .with_config(config.with_delay(DelayWindow::none()))
        .with_transport(transport)
        .with_audit_sink(audit)
        .disable_event_logging()
        .build()
        .expect("lookup builds")
}

pub fn memory_setup() -> (Arc<MockTransport>, Arc<MemoryAuditLog>, Lookup) {
    let transport = Arc::new(MockTransport::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let lookup = lookup_with(transport.clone(), audit.clone(), LookupConfig::default());
    (transport, audit, lookup)
}
