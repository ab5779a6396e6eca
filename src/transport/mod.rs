//! Transport seam between the lookup orchestrator and the network.
//!
//! The orchestrator only speaks [`RegistryTransport`]; the reqwest-backed
//! implementation keeps one cookie-carrying session per evasion profile so a
//! warm-up and the query that follows it share the same challenge cookies.

pub mod reqwest_client;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

use crate::modules::evasion::EvasionProfile;

pub use reqwest_client::ReqwestTransport;

/// Outbound request routed through a specific evasion profile.
#[derive(Debug, Clone)]
pub struct RegistryRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
    pub profile: EvasionProfile,
}

impl RegistryRequest {
    pub fn new(method: Method, url: Url, profile: EvasionProfile, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout,
            profile,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Minimal response representation returned by the transport abstraction.
#[derive(Debug, Clone)]
pub struct RegistryResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl RegistryResponse {
    /// Body prefix for diagnostics.
    pub fn body_preview(&self, limit: usize) -> String {
        String::from_utf8_lossy(&self.body).chars().take(limit).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("invalid egress endpoint: {0}")]
    InvalidEgress(String),
}

/// Contract that abstracts the HTTP transport used by the lookup pipeline.
///
/// Implementations must keep cookies per [`EvasionProfile`] so consecutive
/// requests with the same profile behave as one browser session.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse, TransportError>;
}
