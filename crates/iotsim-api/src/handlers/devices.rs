//! Device CRUD and lifecycle endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use iotsim_devices::DeviceEntry;

use crate::handlers::common::{ok, HandlerResult};
use crate::models::device::{BindDeviceRequest, CreateDeviceRequest, DeviceListQuery};
use crate::models::pagination::Page;
use crate::models::{BindResponse, ErrorResponse, WebhookAcceptedResponse};
use crate::server::ServerState;

pub async fn list_devices_handler(
    State(state): State<ServerState>,
    Query(query): Query<DeviceListQuery>,
) -> HandlerResult<Page<serde_json::Value>> {
    let mut matched = Vec::new();
    for entry in state.manager.list_devices().await {
        if let Some(status) = query.status {
            if entry.status().await != status {
                continue;
            }
        }
        if let Some(group_id) = &query.group_id {
            if entry.group_id().as_deref() != Some(group_id.as_str()) {
                continue;
            }
        }
        if let Some(model_id) = &query.model_id {
            if entry.model_id() != model_id {
                continue;
            }
        }
        matched.push(entry);
    }

    let total = matched.len();
    let page = query.page.max(1);
    let page_size = query.page_size.max(1);
    let offset = (page - 1) * page_size;

    let mut items = Vec::new();
    for entry in matched.into_iter().skip(offset).take(page_size) {
        items.push(entry.snapshot_json().await);
    }

    ok(Page::new(items, total, page, page_size))
}

pub async fn create_device_handler(
    State(state): State<ServerState>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ErrorResponse> {
    let entry = state
        .manager
        .create_device(&req.model_id, req.device_id, req.group_id, req.override_connection)
        .await?;
    let snapshot = entry.snapshot_json().await;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

pub async fn get_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    let entry = lookup(&state, &device_id).await?;
    ok(entry.snapshot_json().await)
}

pub async fn delete_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> Result<StatusCode, ErrorResponse> {
    state.manager.delete_device(&device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    let entry = lookup(&state, &device_id).await?;
    entry.start().await?;
    ok(entry.snapshot_json().await)
}

pub async fn stop_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    let entry = lookup(&state, &device_id).await?;
    entry.stop().await?;
    ok(entry.snapshot_json().await)
}

pub async fn device_metrics_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    let entry = lookup(&state, &device_id).await?;
    ok(entry.snapshot_json().await)
}

pub async fn bind_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
    Json(req): Json<BindDeviceRequest>,
) -> HandlerResult<BindResponse> {
    let webhook_url = state.manager.bind_proxy(&device_id, req.config.clone()).await?;
    ok(BindResponse {
        device_id,
        status: "bound",
        binding: req.config,
        webhook_url,
    })
}

pub async fn unbind_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    state.manager.unbind_proxy(&device_id).await?;
    ok(serde_json::json!({"deviceId": device_id, "status": "unbound"}))
}

pub async fn device_binding_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    match lookup(&state, &device_id).await? {
        DeviceEntry::Proxy(device) => {
            let snapshot = device.snapshot().await;
            ok(serde_json::json!({
                "deviceId": device_id,
                "status": snapshot.status,
                "binding": snapshot.binding,
                "webhookUrl": snapshot.webhook_url,
            }))
        }
        DeviceEntry::Virtual(_) => Err(ErrorResponse::bad_request(format!("device {device_id} is not a proxy device"))),
    }
}

pub async fn webhook_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> HandlerResult<WebhookAcceptedResponse> {
    if state.manager.webhook_registry().invoke(&device_id, payload) {
        ok(WebhookAcceptedResponse {
            status: "accepted",
            device_id,
        })
    } else {
        Err(ErrorResponse::not_found(format!("webhook handler for device {device_id}")))
    }
}

async fn lookup(state: &ServerState, device_id: &str) -> Result<DeviceEntry, ErrorResponse> {
    state
        .manager
        .get_device(device_id)
        .await
        .ok_or_else(|| ErrorResponse::not_found(format!("device {device_id}")))
}
