//! Reqwest-based implementation of the `RegistryTransport` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use tokio::sync::Mutex;

use super::{RegistryRequest, RegistryResponse, RegistryTransport, TransportError};
use crate::modules::evasion::EvasionProfile;

/// Reqwest client pool keyed by evasion profile.
///
/// Each client owns its cookie jar, so the pool doubles as the session store.
#[derive(Default)]
pub struct ReqwestTransport {
    clients: Mutex<HashMap<EvasionProfile, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, profile: &EvasionProfile) -> Result<Client, TransportError> {
        let mut guard = self.clients.lock().await;
        if let Some(client) = guard.get(profile) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .cookie_store(true)
            .default_headers(profile.fingerprint.headers());

        if let Some(endpoint) = &profile.egress {
            let proxy = Proxy::all(endpoint.as_str())
                .map_err(|err| TransportError::InvalidEgress(err.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        log::debug!(
            "opened session for {} via {}",
            profile.fingerprint,
            profile.egress_label()
        );
        guard.insert(profile.clone(), client.clone());
        Ok(client)
    }

    /// Number of distinct profile sessions opened so far.
    pub async fn session_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[async_trait]
impl RegistryTransport for ReqwestTransport {
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse, TransportError> {
        let client = self.client(&request.profile).await?;

        let mut builder = client
            .request(request.method, request.url.as_str())
            .headers(request.headers)
            .timeout(request.timeout);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_error)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(map_error)?;

        Ok(RegistryResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::evasion::FingerprintTag;
    use url::Url;

    #[tokio::test]
    async fn reuses_session_per_profile() {
        let transport = ReqwestTransport::new();
        let direct = EvasionProfile::direct(FingerprintTag::Chrome124);
        let proxied = EvasionProfile {
            egress: Some(Url::parse("http://user-cr-402:pw@127.0.0.1:8000").unwrap()),
            fingerprint: FingerprintTag::Chrome124,
        };

        transport.client(&direct).await.unwrap();
        transport.client(&direct).await.unwrap();
        transport.client(&proxied).await.unwrap();
        assert_eq!(transport.session_count().await, 2);
    }
}
