//! Device-group lifecycle endpoints: bulk create, launch, stop, delete, and
//! the dropout-simulation endpoint.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use iotsim_devices::{DropoutConfig, GroupSpec, LaunchConfig};

use crate::handlers::common::{ok, HandlerResult};
use crate::models::group::{CreateGroupRequest, StartGroupQuery};
use crate::server::ServerState;
use crate::ErrorResponse;

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCreatedResponse {
    pub group_id: String,
    pub device_ids: Vec<String>,
}

pub async fn create_group_handler(
    State(state): State<ServerState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupCreatedResponse>), ErrorResponse> {
    let (group_id, device_ids) = state
        .manager
        .create_device_group(GroupSpec {
            model_id: req.model_id,
            count: req.count,
            group_id: req.group_id,
            id_pattern: req.id_pattern,
            stagger_ms: req.stagger_ms,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(GroupCreatedResponse { group_id, device_ids })))
}

pub async fn start_group_handler(
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
    Query(query): Query<StartGroupQuery>,
    body: Option<Json<LaunchConfig>>,
) -> HandlerResult<iotsim_devices::GroupOpSummary> {
    let launch = match body {
        Some(Json(config)) => config,
        None => match query.stagger_ms {
            Some(delay_ms) if delay_ms > 0 => LaunchConfig::Linear { delay_ms },
            _ => LaunchConfig::Immediate,
        },
    };
    let summary = state.manager.start_group(&group_id, launch).await?;
    ok(summary)
}

pub async fn stop_group_handler(
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> HandlerResult<iotsim_devices::GroupOpSummary> {
    let summary = state.manager.stop_group(&group_id).await?;
    ok(summary)
}

pub async fn delete_group_handler(
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<StatusCode, ErrorResponse> {
    state.manager.delete_group(&group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dropout_group_handler(
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
    Json(config): Json<DropoutConfig>,
) -> HandlerResult<iotsim_devices::DropoutSummary> {
    let summary = state.manager.simulate_dropouts(&group_id, config).await?;
    ok(summary)
}
