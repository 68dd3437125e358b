//! Engine-wide aggregate stats endpoint.

use axum::extract::State;
use iotsim_devices::EngineStats;

use crate::handlers::common::{ok, HandlerResult};
use crate::server::ServerState;

pub async fn stats_handler(State(state): State<ServerState>) -> HandlerResult<EngineStats> {
    ok(state.manager.stats().await)
}
