use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};

/// Streams a request through to the single configured Tezos node host,
/// untouched, for requests the coordinator marked `pass_through = true`
/// (non-cacheable reads and state-changing calls). No caching, no body
/// inspection.
pub struct PassthroughClient {
    client: reqwest::Client,
    base: String,
}

impl PassthroughClient {
    pub fn new(base: String, read_timeout: Duration, write_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(write_timeout)
            .timeout(read_timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self { client, base }
    }

    pub async fn forward(&self, method: Method, path: &str, headers: HeaderMap, body: Bytes) -> Response {
        let url = format!("{}{path}", self.base);

        let result = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        match result {
            Ok(upstream) => {
                let status = upstream.status();
                let headers = upstream.headers().clone();
                match upstream.bytes().await {
                    Ok(body) => {
                        let mut response = (status, body).into_response();
                        *response.headers_mut() = headers;
                        response
                    }
                    Err(_) => StatusCode::BAD_GATEWAY.into_response(),
                }
            }
            Err(_) => StatusCode::BAD_GATEWAY.into_response(),
        }
    }
}
