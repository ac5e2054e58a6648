pub mod metrics_buffer;
pub mod postgres;
pub mod project_cache;
pub mod response_cache;
pub mod upstream_client;

pub use metrics_buffer::InMemoryMetricsBuffer;
pub use postgres::{PostgresMetricsStore, PostgresProjectStore};
pub use project_cache::InMemoryProjectCache;
pub use response_cache::LruResponseCache;
pub use upstream_client::ReqwestUpstreamClient;
