//! Liveness and readiness probes.

use axum::extract::State;
use axum::response::Json;

use crate::models::{HealthResponse, ReadyResponse};
use crate::server::ServerState;

pub async fn health_handler(State(state): State<ServerState>) -> Json<HealthResponse> {
    let device_count = state.manager.device_count().await;
    let running_device_count = count_running(&state).await;

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        device_count,
        running_device_count,
    })
}

pub async fn ready_handler(State(_state): State<ServerState>) -> Json<ReadyResponse> {
    Json(ReadyResponse { status: "ready" })
}

async fn count_running(state: &ServerState) -> usize {
    let mut running = 0;
    for entry in state.manager.list_devices().await {
        if entry.status().await == iotsim_core::types::DeviceStatus::Running {
            running += 1;
        }
    }
    running
}
