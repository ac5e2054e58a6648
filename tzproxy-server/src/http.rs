use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use tzproxy_core::error::GatewayError;
use tzproxy_core::model::{Action, Request};
use tzproxy_gateway::ProxyCoordinator;
use tzproxy_telemetry::{MetricsCollector, RequestOutcome};

use crate::passthrough::PassthroughClient;

pub struct AppState {
    pub coordinator: Arc<ProxyCoordinator>,
    pub metrics: Arc<MetricsCollector>,
    pub passthrough: Arc<PassthroughClient>,
}

/// `idle_timeout` bounds how long a single inbound request may take end to
/// end (coordinator call plus, for passthrough, the upstream round-trip)
/// before the connection is dropped — the HTTP adapter's reading of
/// `Proxy.IdleTimeout`.
pub fn build_router(state: Arc<AppState>, idle_timeout: Duration) -> Router {
    Router::new()
        .route("/{uuid}/{*rpc_path}", any(handle))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(idle_timeout))
        .with_state(state)
}

/// Parses the project UUID from the first path segment, classifies the HTTP
/// method into `OBTAIN`/`PUSH`, calls the coordinator, and either writes its
/// response directly or streams the request through the raw reverse proxy
/// when `pass_through` is set.
async fn handle(
    State(state): State<Arc<AppState>>,
    Path((uuid, rpc_path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let action = if method == Method::GET || method == Method::HEAD { Action::Obtain } else { Action::Push };

    let full_path = match uri.query() {
        Some(q) => format!("/{rpc_path}?{q}"),
        None => format!("/{rpc_path}"),
    };

    let request = Request::new(uuid, full_path.clone(), action);
    let outcome = state.coordinator.proxy(&request).await;

    record_metrics(&state.metrics, &outcome);

    if outcome.pass_through {
        return state.passthrough.forward(method, &full_path, headers, body).await;
    }

    let status = outcome
        .error
        .as_ref()
        .map(|e| StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .unwrap_or(StatusCode::OK);

    (status, outcome.body).into_response()
}

fn record_metrics(metrics: &MetricsCollector, outcome: &tzproxy_gateway::ProxyOutcome) {
    let classified = if let Some(hit) = outcome.cache_hit {
        if hit {
            RequestOutcome::CacheHit
        } else {
            RequestOutcome::CacheMiss
        }
    } else if outcome.pass_through {
        RequestOutcome::Passthrough
    } else {
        match &outcome.error {
            Some(GatewayError::ProjectNotFound(_)) | Some(GatewayError::ProjectLookupFailed(_)) => {
                RequestOutcome::UnknownProject
            }
            Some(GatewayError::UpstreamUnavailable) => RequestOutcome::UpstreamFailure,
            Some(_) => return,
            None => RequestOutcome::Denied,
        }
    };
    metrics.record_outcome(classified);
}
