use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::GatewayError;
use crate::model::{MetricRecord, Project, Request};

/// A durable project store — the relational database behind the project
/// resolver. Out of the core's control plane; the coordinator only ever talks
/// to the `ProjectStore`/`ProjectCache` traits.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Project>, GatewayError>;
}

/// The hot project cache consulted before the durable store.
#[async_trait]
pub trait ProjectCache: Send + Sync {
    async fn find_by_uuid(&self, uuid: &str) -> Option<Project>;

    async fn save(&self, title: String, uuid: String, creation_date: DateTime<Utc>);
}

/// A blockchain repository: one instance is the response cache, the other is
/// the real upstream node client. Both satisfy `get`; only the cache instance
/// is also asked to `add`. The coordinator is polymorphic over this shared
/// shape intentionally — caching is "just another repository" from its
/// perspective.
#[async_trait]
pub trait BlockchainRepository: Send + Sync {
    /// Fetch bytes for `request` at `url`. Returns `Err(GatewayError::CacheMiss)`
    /// for a cache miss, or `Err(GatewayError::UpstreamUnavailable)` for a
    /// network/timeout/non-2xx upstream failure.
    async fn get(&self, request: &Request, url: &str) -> Result<Bytes, GatewayError>;
}

/// Populate a cache-flavored `BlockchainRepository` after an upstream fetch.
/// Split from `BlockchainRepository` because only the cache implements it —
/// the upstream client has no `add`.
#[async_trait]
pub trait CachePopulate: Send + Sync {
    async fn add(&self, request: &Request, response: Bytes);
}

/// The durable metrics store — batch-persists drained metric records.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn save_many(&self, records: &[MetricRecord]) -> Result<(), GatewayError>;
}

/// The in-memory, size-aware accumulator of per-request metric records.
///
/// `add` must be safe against concurrent `get_all`/`clear`/`len` (see the
/// flusher for how the observed race is handled).
#[async_trait]
pub trait MetricsBuffer: Send + Sync {
    async fn add(&self, record: MetricRecord);

    /// Snapshot of all currently buffered records, in insertion order.
    async fn get_all(&self) -> Vec<MetricRecord>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove the first `count` records (the ones a prior `get_all` observed).
    /// Records appended after that snapshot are left untouched — see the
    /// metric-loss-on-race design note.
    async fn clear(&self, count: usize);
}
