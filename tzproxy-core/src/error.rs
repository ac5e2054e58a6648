use thiserror::Error;

/// Unified error type for the proxy's request-routing and metrics pipeline.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project lookup failed: {0}")]
    ProjectLookupFailed(String),

    #[error("no response from proxy")]
    UpstreamUnavailable,

    #[error("cache miss")]
    CacheMiss,

    #[error("cache add failed: {0}")]
    CacheAddFailed(String),

    #[error("metrics persist failed: {0}")]
    MetricsPersistFailed(String),

    #[error("policy pattern failed to compile: {0}")]
    PolicyCompileFailed(String),

    #[error("config error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Map to an HTTP status code for the entry adapter.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::ProjectNotFound(_) => 404,
            GatewayError::ProjectLookupFailed(_) => 500,
            GatewayError::UpstreamUnavailable => 502,
            GatewayError::Config(_) => 500,
            // Internal-only variants never reach the HTTP boundary.
            GatewayError::CacheMiss
            | GatewayError::CacheAddFailed(_)
            | GatewayError::MetricsPersistFailed(_)
            | GatewayError::PolicyCompileFailed(_) => 500,
        }
    }
}
