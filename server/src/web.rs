//! Operational HTTP surface: `/healthz` and `/stats` (§6 "Operational
//! signals"). Grounded on `web_server.rs`'s router shape
//! (`Router::new().route(...).with_state(state)`, bind to a fixed loopback
//! address, `axum::serve`) with the session/job/PTY routes stripped since
//! none of that surface exists in this system.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use fleetcore::manager::WorkerManager;
use serde::Serialize;

#[derive(Clone)]
struct AppState {
    manager: Arc<WorkerManager>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct WorkerStatsView {
    account_id: String,
    running: bool,
}

#[derive(Serialize)]
struct QueueStatsView {
    account_id: String,
    enqueued: u64,
    completed: u64,
    failed: u64,
    dlq_size: u64,
}

#[derive(Serialize)]
struct StatsResponse {
    workers: Vec<WorkerStatsView>,
    queues: Vec<QueueStatsView>,
}

async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn stats_handler(axum::extract::State(state): axum::extract::State<AppState>) -> Json<StatsResponse> {
    let fleet = state.manager.get_stats().await;
    let workers = fleet
        .workers
        .into_iter()
        .map(|w| WorkerStatsView {
            account_id: w.account_id.to_string(),
            running: w.running,
        })
        .collect();

    let queues = state
        .manager
        .queue_stats_by_account()
        .await
        .into_iter()
        .map(|(account_id, stats)| QueueStatsView {
            account_id: account_id.to_string(),
            enqueued: stats.enqueued,
            completed: stats.completed,
            failed: stats.failed,
            dlq_size: stats.dlq_size,
        })
        .collect();

    Json(StatsResponse { workers, queues })
}

/// Binds to `127.0.0.1:<port>` and serves until the process is killed.
pub async fn run_http_server(manager: Arc<WorkerManager>, port: u16) -> Result<(), std::io::Error> {
    let state = AppState { manager };
    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/stats", get(stats_handler))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(%addr, "fleet server operational surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
