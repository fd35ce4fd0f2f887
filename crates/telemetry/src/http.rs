// Path: crates/telemetry/src/http.rs
//! The `/metrics` and `/healthz` HTTP surface (§10.2, §10.6).

use axum::{
    body::Bytes,
    error_handling::HandleErrorLayer,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderName, StatusCode},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::{net::SocketAddr, time::Duration};
use tokio::{signal, sync::watch};
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

use pop_consensus::ReplicaStatus;

async fn metrics_handler() -> ([(HeaderName, String); 1], Bytes) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 20);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(target: "telemetry", error = %e, "failed to encode prometheus metrics");
    }
    ([(CONTENT_TYPE, encoder.format_type().to_string())], buf.into())
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    detail: Option<String>,
}

/// The §6 status channel value, surfaced as `/healthz` JSON. A `Fatal`
/// replica answers `503` so orchestration can distinguish "halted" from
/// "merely busy" (`ViewChanging`/`Overloaded`/`Lagging` all answer `200`).
async fn healthz_handler(State(status): State<watch::Receiver<ReplicaStatus>>) -> (StatusCode, Json<HealthBody>) {
    let current = status.borrow().clone();
    let (code, name, detail) = match &current {
        ReplicaStatus::Healthy => (StatusCode::OK, "Healthy", None),
        ReplicaStatus::Lagging { h_local, h_observed } => {
            (StatusCode::OK, "Lagging", Some(format!("local={h_local} observed={h_observed}")))
        }
        ReplicaStatus::ViewChanging { h, from, to } => (StatusCode::OK, "ViewChanging", Some(format!("h={h} from={from} to={to}"))),
        ReplicaStatus::Overloaded => (StatusCode::OK, "Overloaded", None),
        ReplicaStatus::Fatal { reason } => (StatusCode::SERVICE_UNAVAILABLE, "Fatal", Some(reason.clone())),
    };
    (code, Json(HealthBody { status: name, detail }))
}

async fn handle_service_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled internal error: {err}"))
    }
}

/// Serves `/metrics` and `/healthz` on `addr` until the process receives
/// `SIGINT`. `status` is the single-writer §6 status channel the consensus
/// task publishes to.
pub async fn run_server(addr: SocketAddr, status: watch::Receiver<ReplicaStatus>) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(status)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_service_error))
                .layer(TraceLayer::new_for_http())
                .load_shed()
                .concurrency_limit(8)
                .timeout(Duration::from_secs(2)),
        );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target: "telemetry", error = %e, "failed to bind telemetry http server");
            return;
        }
    };
    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!(target: "telemetry", addr = %local_addr, "listening");
    }

    let graceful = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(target: "telemetry", error = %e, "failed to install ctrl-c handler");
        }
        tracing::info!(target: "telemetry", "shutting down gracefully");
    });

    if let Err(e) = graceful.await {
        tracing::error!(target: "telemetry", error = %e, "server error");
    }
}
