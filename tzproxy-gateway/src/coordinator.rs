use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use tzproxy_core::error::GatewayError;
use tzproxy_core::model::{Action, MetricRecord, Request};
use tzproxy_core::policy::PolicyMatcher;
use tzproxy_core::ports::{BlockchainRepository, CachePopulate, MetricsBuffer};
use tzproxy_telemetry::MetricsCollector;

use crate::flusher::MetricsFlusher;
use crate::resolver::ProjectResolver;

const BLACKLISTED_BODY: &[u8] = b"call blacklisted";

/// Result of `ProxyCoordinator::proxy`. `pass_through = true` instructs the
/// HTTP adapter to stream the original request through the raw reverse proxy
/// untouched, ignoring `body`.
pub struct ProxyOutcome {
    pub body: Bytes,
    pub pass_through: bool,
    pub error: Option<GatewayError>,
    /// `Some(true)` if served directly from the response cache, `Some(false)`
    /// if served after a cache miss forced an upstream fetch, `None` when no
    /// cache lookup was attempted at all (passthrough, denied, unresolved).
    /// Exists purely to let the HTTP adapter feed an accurate hit-ratio
    /// metric; the coordinator's own control flow never reads it back.
    pub cache_hit: Option<bool>,
}

impl ProxyOutcome {
    fn denied() -> Self {
        Self { body: Bytes::from_static(BLACKLISTED_BODY), pass_through: false, error: None, cache_hit: None }
    }

    fn passthrough() -> Self {
        Self { body: Bytes::new(), pass_through: true, error: None, cache_hit: None }
    }

    fn served(body: Bytes, cache_hit: bool) -> Self {
        Self { body, pass_through: false, error: None, cache_hit: Some(cache_hit) }
    }

    fn failed(error: GatewayError) -> Self {
        Self { body: Bytes::from(error.to_string()), pass_through: false, error: Some(error), cache_hit: None }
    }
}

/// Where a cache-miss `OBTAIN` should be forwarded to fetch a fresh copy.
pub struct UpstreamBases {
    pub archive_base: String,
    pub rolling_base: String,
}

/// Composes project resolution, policy evaluation, cache-through proxying,
/// and metric accounting for each inbound request. Check order is fixed:
/// project → allow → (action + cacheable) → cache → upstream. Never
/// reorder — the allow check must never run against an unresolved project,
/// and the cache must never be consulted for a denied or non-cacheable path.
pub struct ProxyCoordinator {
    resolver: Arc<ProjectResolver>,
    policy: PolicyMatcher,
    response_cache: Arc<dyn BlockchainRepository>,
    cache_populate: Arc<dyn CachePopulate>,
    upstream: Arc<dyn BlockchainRepository>,
    metrics_buffer: Arc<dyn MetricsBuffer>,
    flusher: Arc<MetricsFlusher>,
    metrics: Arc<MetricsCollector>,
    bases: UpstreamBases,
    cache_max_metric_items: usize,
}

impl ProxyCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: Arc<ProjectResolver>,
        policy: PolicyMatcher,
        response_cache: Arc<dyn BlockchainRepository>,
        cache_populate: Arc<dyn CachePopulate>,
        upstream: Arc<dyn BlockchainRepository>,
        metrics_buffer: Arc<dyn MetricsBuffer>,
        flusher: Arc<MetricsFlusher>,
        metrics: Arc<MetricsCollector>,
        bases: UpstreamBases,
        cache_max_metric_items: usize,
    ) -> Self {
        Self {
            resolver,
            policy,
            response_cache,
            cache_populate,
            upstream,
            metrics_buffer,
            flusher,
            metrics,
            bases,
            cache_max_metric_items,
        }
    }

    pub async fn proxy(&self, request: &Request) -> ProxyOutcome {
        if let Err(e) = self.resolver.ensure_project_known(&request.uuid).await {
            return ProxyOutcome::failed(e);
        }

        if !self.policy.is_allowed(&request.path) {
            return ProxyOutcome::denied();
        }

        let cacheable = request.action == Action::Obtain && self.policy.is_cacheable(&request.path);

        let outcome = if cacheable {
            self.serve_cacheable(request).await
        } else {
            ProxyOutcome::passthrough()
        };

        if outcome.error.is_none() {
            self.record_metric(request).await;
        }

        outcome
    }

    async fn serve_cacheable(&self, request: &Request) -> ProxyOutcome {
        // The cache adapter ignores the url argument, keying purely on
        // (project uuid, normalized path); it is passed through here only
        // because BlockchainRepository::get takes it uniformly for both
        // cache and upstream implementations.
        match self.response_cache.get(request, "").await {
            Ok(body) => ProxyOutcome::served(body, true),
            Err(_) => self.fetch_from_upstream(request).await,
        }
    }

    async fn fetch_from_upstream(&self, request: &Request) -> ProxyOutcome {
        let (base_label, base) = if self.policy.is_rolling_redirection(&request.path) {
            ("rolling", &self.bases.rolling_base)
        } else {
            ("archive", &self.bases.archive_base)
        };
        let url = format!("{base}{}", request.path);

        let started = Instant::now();
        let result = self.upstream.get(request, &url).await;
        self.metrics.observe_upstream_latency(base_label, started.elapsed().as_secs_f64());

        match result {
            Ok(body) => {
                self.cache_populate.add(request, body.clone()).await;
                ProxyOutcome::served(body, false)
            }
            Err(e) => ProxyOutcome::failed(e),
        }
    }

    async fn record_metric(&self, request: &Request) {
        self.metrics_buffer.add(MetricRecord::for_request(request, Utc::now())).await;
        if self.metrics_buffer.len().await >= self.cache_max_metric_items {
            self.flusher.maybe_drain_on_threshold(self.cache_max_metric_items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use tzproxy_core::model::Project;
    use tzproxy_core::ports::{MetricsStore, ProjectStore};
    use tzproxy_store::{InMemoryMetricsBuffer, InMemoryProjectCache, LruResponseCache};

    struct StaticStore(Option<Project>);

    #[async_trait]
    impl ProjectStore for StaticStore {
        async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Project>, GatewayError> {
            Ok(self.0.clone().filter(|p| p.uuid == uuid))
        }
    }

    struct ScriptedUpstream {
        calls: AtomicUsize,
        response: Result<Bytes, GatewayError>,
        last_url: Mutex<Option<String>>,
    }

    impl ScriptedUpstream {
        fn ok(body: &'static [u8]) -> Self {
            Self { calls: AtomicUsize::new(0), response: Ok(Bytes::from_static(body)), last_url: Mutex::new(None) }
        }

        fn failing() -> Self {
            Self { calls: AtomicUsize::new(0), response: Err(GatewayError::UpstreamUnavailable), last_url: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl BlockchainRepository for ScriptedUpstream {
        async fn get(&self, _request: &Request, url: &str) -> Result<Bytes, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().await = Some(url.to_string());
            self.response.clone()
        }
    }

    struct NoopMetricsStore;

    #[async_trait]
    impl MetricsStore for NoopMetricsStore {
        async fn save_many(&self, _records: &[MetricRecord]) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn project(uuid: &str) -> Project {
        Project { uuid: uuid.into(), title: "p".into(), creation_date: Utc::now() }
    }

    struct Harness {
        coordinator: ProxyCoordinator,
        archive: Arc<ScriptedUpstream>,
        rolling: Arc<ScriptedUpstream>,
        metrics: Arc<InMemoryMetricsBuffer>,
        cache: Arc<LruResponseCache>,
    }

    fn build(
        allow: &[&str],
        deny: &[&str],
        no_cache: &[&str],
        rolling: &[&str],
        archive: ScriptedUpstream,
        rolling_upstream: ScriptedUpstream,
    ) -> Harness {
        let strs = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let policy = PolicyMatcher::new(&strs(allow), &strs(deny), &strs(no_cache), &strs(rolling));

        let project_store = Arc::new(StaticStore(Some(project("p1"))));
        let project_cache = Arc::new(InMemoryProjectCache::new());
        let resolver = Arc::new(ProjectResolver::new(project_store, project_cache));

        let response_cache = Arc::new(LruResponseCache::new(100));
        let metrics = Arc::new(InMemoryMetricsBuffer::new(1000));
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let flusher = Arc::new(MetricsFlusher::new(metrics.clone(), Arc::new(NoopMetricsStore), collector.clone()));

        let archive = Arc::new(archive);
        let rolling_upstream = Arc::new(rolling_upstream);

        // A dedicated dispatcher picks archive vs rolling by url prefix so
        // one ProxyCoordinator can exercise both upstream bases.
        let upstream = Arc::new(DispatchingUpstream {
            archive: archive.clone(),
            rolling: rolling_upstream.clone(),
        });

        let coordinator = ProxyCoordinator::new(
            resolver,
            policy,
            response_cache.clone(),
            response_cache.clone(),
            upstream,
            metrics.clone(),
            flusher,
            collector,
            UpstreamBases { archive_base: "http://archive:8732".into(), rolling_base: "http://rolling:8732".into() },
            100,
        );

        Harness { coordinator, archive, rolling: rolling_upstream, metrics, cache: response_cache }
    }

    struct DispatchingUpstream {
        archive: Arc<ScriptedUpstream>,
        rolling: Arc<ScriptedUpstream>,
    }

    #[async_trait]
    impl BlockchainRepository for DispatchingUpstream {
        async fn get(&self, request: &Request, url: &str) -> Result<Bytes, GatewayError> {
            if url.starts_with("http://rolling") {
                self.rolling.get(request, url).await
            } else {
                self.archive.get(request, url).await
            }
        }
    }

    fn req(path: &str, action: Action) -> Request {
        Request::new("p1", path, action)
    }

    #[tokio::test]
    async fn s1_allow_and_cache_miss_serves_from_upstream_and_populates_cache() {
        let h = build(
            &["^/chains/.*"],
            &[],
            &["^/chains/.*/mempool$"],
            &[],
            ScriptedUpstream::ok(b"X"),
            ScriptedUpstream::ok(b"unused"),
        );

        let out = h.coordinator.proxy(&req("/chains/main/blocks/head", Action::Obtain)).await;
        assert_eq!(out.body, Bytes::from_static(b"X"));
        assert!(!out.pass_through);
        assert!(out.error.is_none());
        assert_eq!(h.archive.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metrics.len().await, 1);

        let cached = h.cache.get(&req("/chains/main/blocks/head", Action::Obtain), "").await.unwrap();
        assert_eq!(cached, Bytes::from_static(b"X"));
    }

    #[tokio::test]
    async fn s2_allow_and_non_cacheable_is_passthrough_with_a_metric() {
        let h = build(
            &["^/chains/.*"],
            &[],
            &["^/chains/.*/mempool$"],
            &[],
            ScriptedUpstream::ok(b"unused"),
            ScriptedUpstream::ok(b"unused"),
        );

        let out = h.coordinator.proxy(&req("/chains/main/mempool", Action::Obtain)).await;
        assert!(out.pass_through);
        assert!(out.error.is_none());
        assert_eq!(h.archive.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.metrics.len().await, 1);
    }

    #[tokio::test]
    async fn s3_deny_inside_allow_is_blacklisted_with_no_metric() {
        let h = build(&["^/chains/.*"], &["^/chains/.*/admin$"], &[], &[], ScriptedUpstream::ok(b"x"), ScriptedUpstream::ok(b"y"));

        let out = h.coordinator.proxy(&req("/chains/main/admin", Action::Obtain)).await;
        assert_eq!(out.body, Bytes::from_static(b"call blacklisted"));
        assert!(!out.pass_through);
        assert!(out.error.is_none());
        assert_eq!(h.metrics.len().await, 0);
    }

    #[tokio::test]
    async fn s4_rolling_redirect_targets_the_rolling_base_only() {
        let h = build(
            &["^/monitor/.*"],
            &[],
            &[],
            &["^/monitor/.*"],
            ScriptedUpstream::ok(b"archive-should-not-be-used"),
            ScriptedUpstream::ok(b"Y"),
        );

        let out = h.coordinator.proxy(&req("/monitor/heads", Action::Obtain)).await;
        assert_eq!(out.body, Bytes::from_static(b"Y"));
        assert_eq!(h.archive.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.rolling.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn s5_unknown_project_surfaces_not_found_with_no_metric() {
        let strs = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let policy = PolicyMatcher::new(&strs(&["^/chains/.*"]), &[], &[], &[]);
        let project_store = Arc::new(StaticStore(None));
        let project_cache = Arc::new(InMemoryProjectCache::new());
        let resolver = Arc::new(ProjectResolver::new(project_store, project_cache));
        let response_cache = Arc::new(LruResponseCache::new(100));
        let metrics = Arc::new(InMemoryMetricsBuffer::new(1000));
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let flusher = Arc::new(MetricsFlusher::new(metrics.clone(), Arc::new(NoopMetricsStore), collector.clone()));
        let upstream = Arc::new(ScriptedUpstream::ok(b"unused"));

        let coordinator = ProxyCoordinator::new(
            resolver,
            policy,
            response_cache.clone(),
            response_cache,
            upstream.clone(),
            metrics.clone(),
            flusher,
            collector,
            UpstreamBases { archive_base: "http://archive:8732".into(), rolling_base: "http://rolling:8732".into() },
            100,
        );

        let out = coordinator.proxy(&req("/chains/main/blocks/head", Action::Obtain)).await;
        assert!(matches!(out.error, Some(GatewayError::ProjectNotFound(_))));
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.len().await, 0);
    }

    #[tokio::test]
    async fn s6_upstream_down_on_miss_reports_unavailable_with_no_metric() {
        let h = build(&["^/chains/.*"], &[], &[], &[], ScriptedUpstream::failing(), ScriptedUpstream::ok(b"unused"));

        let out = h.coordinator.proxy(&req("/chains/main/blocks/head", Action::Obtain)).await;
        assert_eq!(out.body.as_ref(), b"no response from proxy");
        assert!(!out.pass_through);
        assert!(matches!(out.error, Some(GatewayError::UpstreamUnavailable)));
        assert_eq!(h.metrics.len().await, 0, "no metric recorded for upstream failure after a cache miss");
    }

    #[tokio::test]
    async fn cache_hit_never_calls_upstream() {
        let h = build(&["^/chains/.*"], &[], &[], &[], ScriptedUpstream::ok(b"first"), ScriptedUpstream::ok(b"unused"));

        let r = req("/chains/main/blocks/head", Action::Obtain);
        let first = h.coordinator.proxy(&r).await;
        assert_eq!(first.body, Bytes::from_static(b"first"));
        assert_eq!(h.archive.calls.load(Ordering::SeqCst), 1);

        let second = h.coordinator.proxy(&r).await;
        assert_eq!(second.body, Bytes::from_static(b"first"));
        assert_eq!(h.archive.calls.load(Ordering::SeqCst), 1, "second call must be served from cache");
        assert_eq!(h.metrics.len().await, 2, "both the miss and the hit are metered requests");
    }
}
