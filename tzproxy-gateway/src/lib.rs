pub mod coordinator;
pub mod flusher;
pub mod resolver;

pub use coordinator::{ProxyCoordinator, ProxyOutcome, UpstreamBases};
pub use flusher::{MetricsFlusher, ShutdownHandle};
pub use resolver::ProjectResolver;
