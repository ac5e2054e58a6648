pub mod logging;
pub mod metrics;

pub use metrics::{MetricsCollector, RequestOutcome};
