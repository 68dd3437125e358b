//! Device model catalogue endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use iotsim_devices::DeviceModelConfig;

use crate::handlers::common::{ok, HandlerResult};
use crate::models::ErrorResponse;
use crate::server::ServerState;

pub async fn list_models_handler(State(state): State<ServerState>) -> HandlerResult<Vec<DeviceModelConfig>> {
    ok(state.registry.list().await)
}

pub async fn get_model_handler(
    State(state): State<ServerState>,
    Path(model_id): Path<String>,
) -> HandlerResult<DeviceModelConfig> {
    let model = state
        .registry
        .get(&model_id)
        .await
        .ok_or_else(|| ErrorResponse::not_found(format!("model {model_id}")))?;
    ok(model)
}

pub async fn create_model_handler(
    State(state): State<ServerState>,
    Json(model): Json<DeviceModelConfig>,
) -> Result<(StatusCode, Json<DeviceModelConfig>), ErrorResponse> {
    if state.registry.get(&model.id).await.is_some() {
        return Err(ErrorResponse::new(
            "already_exists",
            format!("model {} already exists", model.id),
            StatusCode::CONFLICT,
        ));
    }
    let registered = state
        .registry
        .register(model)
        .await
        .map_err(ErrorResponse::from)?;
    Ok((StatusCode::CREATED, Json(registered)))
}
