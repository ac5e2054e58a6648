mod http;
mod passthrough;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::info;

use tzproxy_core::config::GatewayConfig;
use tzproxy_core::policy::PolicyMatcher;
use tzproxy_core::ports::MetricsBuffer;
use tzproxy_gateway::{MetricsFlusher, ProjectResolver, ProxyCoordinator, ShutdownHandle, UpstreamBases};
use tzproxy_store::{InMemoryMetricsBuffer, InMemoryProjectCache, LruResponseCache, PostgresMetricsStore, PostgresProjectStore, ReqwestUpstreamClient};
use tzproxy_telemetry::MetricsCollector;

use crate::http::AppState;
use crate::passthrough::PassthroughClient;

#[derive(Parser, Debug)]
#[command(name = "tzproxy", version, about = "Project-aware reverse proxy for a Tezos node RPC surface")]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config.as_deref())?;

    tzproxy_telemetry::logging::init(&config.observability.log_level, config.observability.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "tzproxy starting");

    let read_timeout = Duration::from_secs(config.proxy.read_timeout_secs);
    let write_timeout = Duration::from_secs(config.proxy.write_timeout_secs);

    let project_store = Arc::new(PostgresProjectStore::connect(&config.database.url, config.database.max_connections).await?);
    let metrics_store = Arc::new(PostgresMetricsStore::connect(&config.database.url, config.database.max_connections).await?);
    let project_cache = Arc::new(InMemoryProjectCache::new());
    let resolver = Arc::new(ProjectResolver::new(project_store, project_cache));

    let response_cache = Arc::new(LruResponseCache::new(config.proxy.response_cache_capacity));
    let upstream = Arc::new(ReqwestUpstreamClient::new(write_timeout, read_timeout));

    let metrics_collector = Arc::new(MetricsCollector::new()?);

    let metrics_buffer = Arc::new(InMemoryMetricsBuffer::new(
        config.proxy.cache_max_metric_items * config.proxy.metrics_buffer_overflow_factor,
    ));
    let flusher = Arc::new(MetricsFlusher::new(metrics_buffer.clone(), metrics_store, metrics_collector.clone()));
    let metrics_buffer_for_gauge = metrics_buffer.clone();

    let policy = PolicyMatcher::new(
        &config.proxy.whitelisted_methods,
        &config.proxy.blocked_methods,
        &config.proxy.dont_cache,
        &config.proxy.whitelisted_rolling,
    );

    let coordinator = Arc::new(ProxyCoordinator::new(
        resolver,
        policy,
        response_cache.clone(),
        response_cache,
        upstream,
        metrics_buffer,
        flusher.clone(),
        metrics_collector.clone(),
        UpstreamBases { archive_base: config.tezos.archive_base(), rolling_base: config.tezos.rolling_base() },
        config.proxy.cache_max_metric_items,
    ));

    let passthrough_client = Arc::new(PassthroughClient::new(config.tezos.default_base(), read_timeout, write_timeout));

    let shutdown = ShutdownHandle::new();
    let flusher_task = tokio::spawn(flusher.run_time_triggered(Duration::from_secs(config.proxy.routine_delay_secs), shutdown.clone()));

    let metrics_server = tokio::spawn(serve_metrics(config.observability.metrics_addr.clone(), metrics_collector.clone()));
    tokio::spawn(report_buffer_len(metrics_buffer_for_gauge, metrics_collector.clone()));

    let app_state = Arc::new(AppState { coordinator, metrics: metrics_collector, passthrough: passthrough_client });
    let router = http::build_router(app_state, Duration::from_secs(config.proxy.idle_timeout_secs));

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening for RPC requests");

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown.clone()))
        .await?;

    flusher_task.await?;
    metrics_server.abort();

    info!("tzproxy stopped");
    Ok(())
}

/// Samples the metrics buffer length into the Prometheus gauge every second,
/// independent of the flush cadence.
async fn report_buffer_len(buffer: Arc<dyn MetricsBuffer>, collector: Arc<MetricsCollector>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        collector.set_metrics_buffer_len(buffer.len().await);
    }
}

async fn serve_metrics(addr: String, collector: Arc<MetricsCollector>) -> anyhow::Result<()> {
    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let collector = collector.clone();
            async move { collector.gather_text().unwrap_or_default() }
        }),
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "serving prometheus metrics");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn wait_for_shutdown_signal(shutdown: ShutdownHandle) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight requests");
    shutdown.trigger();
}
