use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Outcome label recorded for every completed `proxy()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    CacheHit,
    CacheMiss,
    Passthrough,
    Denied,
    UnknownProject,
    UpstreamFailure,
}

impl RequestOutcome {
    fn label(self) -> &'static str {
        match self {
            RequestOutcome::CacheHit => "hit",
            RequestOutcome::CacheMiss => "miss",
            RequestOutcome::Passthrough => "passthrough",
            RequestOutcome::Denied => "denied",
            RequestOutcome::UnknownProject => "unknown_project",
            RequestOutcome::UpstreamFailure => "upstream_failure",
        }
    }
}

/// Prometheus metrics for the proxy, registered against a private registry
/// exposed via a `/metrics` text endpoint.
pub struct MetricsCollector {
    registry: Registry,

    requests_total: IntCounterVec,
    cache_hit_ratio: Gauge,
    upstream_latency: HistogramVec,
    metrics_buffer_len: IntGauge,
    flush_outcomes_total: IntCounterVec,
    flush_records_drained_total: IntCounter,

    cache_hits: IntCounter,
    cache_misses: IntCounter,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("tzproxy_requests_total", "Total proxied requests by outcome").namespace("tzproxy"),
            &["outcome"],
        )?;

        let cache_hit_ratio = Gauge::new("tzproxy_cache_hit_ratio", "Response cache hit ratio since startup")?;

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new("tzproxy_upstream_latency_seconds", "Upstream request latency")
                .namespace("tzproxy")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["base"],
        )?;

        let metrics_buffer_len =
            IntGauge::new("tzproxy_metrics_buffer_len", "Current length of the in-memory metrics buffer")?;

        let flush_outcomes_total = IntCounterVec::new(
            Opts::new("tzproxy_flush_outcomes_total", "Metrics flush attempts by outcome").namespace("tzproxy"),
            &["outcome"],
        )?;

        let flush_records_drained_total = IntCounter::new(
            "tzproxy_flush_records_drained_total",
            "Total metric records successfully handed to the durable store",
        )?;

        let cache_hits = IntCounter::new("tzproxy_cache_hits_total", "Response cache hits")?;
        let cache_misses = IntCounter::new("tzproxy_cache_misses_total", "Response cache misses")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(cache_hit_ratio.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;
        registry.register(Box::new(metrics_buffer_len.clone()))?;
        registry.register(Box::new(flush_outcomes_total.clone()))?;
        registry.register(Box::new(flush_records_drained_total.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            cache_hit_ratio,
            upstream_latency,
            metrics_buffer_len,
            flush_outcomes_total,
            flush_records_drained_total,
            cache_hits,
            cache_misses,
        })
    }

    pub fn record_outcome(&self, outcome: RequestOutcome) {
        self.requests_total.with_label_values(&[outcome.label()]).inc();
        match outcome {
            RequestOutcome::CacheHit => {
                self.cache_hits.inc();
                self.refresh_cache_hit_ratio();
            }
            RequestOutcome::CacheMiss => {
                self.cache_misses.inc();
                self.refresh_cache_hit_ratio();
            }
            _ => {}
        }
    }

    fn refresh_cache_hit_ratio(&self) {
        let hits = self.cache_hits.get() as f64;
        let misses = self.cache_misses.get() as f64;
        let total = hits + misses;
        if total > 0.0 {
            self.cache_hit_ratio.set(hits / total);
        }
    }

    pub fn observe_upstream_latency(&self, base: &str, duration_secs: f64) {
        self.upstream_latency.with_label_values(&[base]).observe(duration_secs);
    }

    pub fn set_metrics_buffer_len(&self, len: usize) {
        self.metrics_buffer_len.set(len as i64);
    }

    pub fn record_flush(&self, success: bool, drained: usize) {
        let outcome = if success { "success" } else { "failure" };
        self.flush_outcomes_total.with_label_values(&[outcome]).inc();
        if success {
            self.flush_records_drained_total.inc_by(drained as u64);
        }
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
