use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use tzproxy_core::error::GatewayError;
use tzproxy_core::model::Request;
use tzproxy_core::ports::{BlockchainRepository, CachePopulate};

/// A bounded LRU response cache keyed by (project UUID, normalized path).
///
/// Eviction policy and capacity are implementation parameters of this
/// adapter; the coordinator's correctness never depends on a hit.
pub struct LruResponseCache {
    entries: Cache<String, Bytes>,
}

impl LruResponseCache {
    pub fn new(capacity: u64) -> Self {
        Self { entries: Cache::new(capacity) }
    }

    fn key(request: &Request) -> String {
        let normalized = request.path.split('?').next().unwrap_or("");
        format!("{}:/{}", request.uuid, normalized.trim_matches('/'))
    }
}

#[async_trait]
impl BlockchainRepository for LruResponseCache {
    async fn get(&self, request: &Request, _url: &str) -> Result<Bytes, GatewayError> {
        self.entries.get(&Self::key(request)).await.ok_or(GatewayError::CacheMiss)
    }
}

#[async_trait]
impl CachePopulate for LruResponseCache {
    async fn add(&self, request: &Request, response: Bytes) {
        self.entries.insert(Self::key(request), response).await;
    }
}
