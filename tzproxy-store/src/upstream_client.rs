use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tzproxy_core::error::GatewayError;
use tzproxy_core::model::Request;
use tzproxy_core::ports::BlockchainRepository;

/// Fetches a fully-qualified URL from a real node over HTTP. Does not
/// interpret the response body. Any network error, timeout, or non-2xx
/// status is reported as `UpstreamUnavailable` — the caller only ever sees
/// "usable bytes" or "unavailable".
pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
}

impl ReqwestUpstreamClient {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self { client }
    }
}

#[async_trait]
impl BlockchainRepository for ReqwestUpstreamClient {
    async fn get(&self, _request: &Request, url: &str) -> Result<Bytes, GatewayError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|_| GatewayError::UpstreamUnavailable)?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamUnavailable);
        }

        response.bytes().await.map_err(|_| GatewayError::UpstreamUnavailable)
    }
}
