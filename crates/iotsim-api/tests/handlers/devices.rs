use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;

use iotsim_api::handlers::devices;
use iotsim_api::models::device::{BindDeviceRequest, CreateDeviceRequest, DeviceListQuery};
use iotsim_devices::model::ConnectionConfig;
use iotsim_devices::BindingConfig;

use crate::common::{constant_sensor_model, proxy_model, spawn_http_200_sink, test_server_state};

fn create_req(model_id: &str, device_id: Option<&str>) -> CreateDeviceRequest {
    CreateDeviceRequest {
        model_id: model_id.to_string(),
        device_id: device_id.map(|s| s.to_string()),
        group_id: None,
        override_connection: None,
    }
}

fn default_query() -> DeviceListQuery {
    DeviceListQuery {
        status: None,
        group_id: None,
        model_id: None,
        page: 1,
        page_size: 20,
    }
}

#[tokio::test]
async fn create_device_rejects_unknown_model() {
    let (state, _dir) = test_server_state(10).await;

    let err = devices::create_device_handler(State(state), Json(create_req("does-not-exist", None)))
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_device_rejects_duplicate_id() {
    let (state, _dir) = test_server_state(10).await;
    state.registry.register(constant_sensor_model("sensor-1", 50)).await.unwrap();

    devices::create_device_handler(State(state.clone()), Json(create_req("sensor-1", Some("dup"))))
        .await
        .expect("first create succeeds");

    let err = devices::create_device_handler(State(state), Json(create_req("sensor-1", Some("dup"))))
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_device_rejects_when_at_capacity() {
    let (state, _dir) = test_server_state(1).await;
    state.registry.register(constant_sensor_model("sensor-1", 50)).await.unwrap();

    devices::create_device_handler(State(state.clone()), Json(create_req("sensor-1", Some("a"))))
        .await
        .expect("first create fits capacity");

    let err = devices::create_device_handler(State(state), Json(create_req("sensor-1", Some("b"))))
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn get_and_delete_unknown_device_returns_not_found() {
    let (state, _dir) = test_server_state(10).await;

    let err = devices::get_device_handler(State(state.clone()), Path("ghost".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);

    let err = devices::delete_device_handler(State(state), Path("ghost".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

/// End-to-end scenario: create a sensor device, start it, wait past a few
/// telemetry intervals, and confirm the metrics snapshot shows messages
/// having actually been sent.
#[tokio::test]
async fn start_device_then_metrics_reflect_sent_messages() {
    let (state, _dir) = test_server_state(10).await;
    state.registry.register(constant_sensor_model("sensor-1", 20)).await.unwrap();
    let sink_addr = spawn_http_200_sink().await;

    let mut req = create_req("sensor-1", Some("dev-1"));
    req.override_connection = Some(ConnectionConfig {
        broker: Some(sink_addr.ip().to_string()),
        port: Some(sink_addr.port()),
        ..Default::default()
    });

    let (status, Json(created)) = devices::create_device_handler(State(state.clone()), Json(req))
        .await
        .expect("create succeeds");
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["deviceId"], "dev-1");
    assert_eq!(created["status"], "created");

    let Json(started) = devices::start_device_handler(State(state.clone()), Path("dev-1".to_string()))
        .await
        .expect("start succeeds");
    assert_eq!(started["status"], "running");

    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    let Json(snapshot) = devices::device_metrics_handler(State(state.clone()), Path("dev-1".to_string()))
        .await
        .expect("metrics lookup succeeds");
    let messages_sent = snapshot["counters"]["messagesSent"].as_u64().unwrap_or(0);
    assert!(messages_sent >= 3, "expected at least 3 messages sent, got {messages_sent}");

    let Json(stopped) = devices::stop_device_handler(State(state.clone()), Path("dev-1".to_string()))
        .await
        .expect("stop succeeds");
    assert_eq!(stopped["status"], "stopped");

    devices::delete_device_handler(State(state), Path("dev-1".to_string()))
        .await
        .expect("delete succeeds");
}

#[tokio::test]
async fn list_devices_filters_by_model_id_and_paginates() {
    let (state, _dir) = test_server_state(10).await;
    state.registry.register(constant_sensor_model("sensor-a", 1000)).await.unwrap();
    state.registry.register(constant_sensor_model("sensor-b", 1000)).await.unwrap();

    devices::create_device_handler(State(state.clone()), Json(create_req("sensor-a", Some("a-1"))))
        .await
        .unwrap();
    devices::create_device_handler(State(state.clone()), Json(create_req("sensor-b", Some("b-1"))))
        .await
        .unwrap();

    let mut query = default_query();
    query.model_id = Some("sensor-a".to_string());
    let Json(page) = devices::list_devices_handler(State(state), Query(query)).await.expect("list succeeds");
    assert_eq!(page.total, 1);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0]["deviceId"], "a-1");
}

#[tokio::test]
async fn binding_handler_rejects_non_proxy_device() {
    let (state, _dir) = test_server_state(10).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();
    devices::create_device_handler(State(state.clone()), Json(create_req("sensor-1", Some("dev-1"))))
        .await
        .unwrap();

    let err = devices::device_binding_handler(State(state), Path("dev-1".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

/// HTTP proxy bind/unbind round trip — the path that doesn't need a live
/// broker, mirroring the webhook half of the end-to-end proxy scenario.
#[tokio::test]
async fn http_proxy_bind_unbind_and_webhook_roundtrip() {
    let (state, _dir) = test_server_state(10).await;
    state.registry.register(proxy_model("proxy-1")).await.unwrap();
    devices::create_device_handler(State(state.clone()), Json(create_req("proxy-1", Some("prox-1"))))
        .await
        .unwrap();

    let bind_req = BindDeviceRequest {
        config: BindingConfig {
            protocol: iotsim_core::types::Protocol::Http,
            broker: None,
            port: None,
            topic: None,
            qos: 1,
        },
    };
    let Json(bound) = devices::bind_device_handler(State(state.clone()), Path("prox-1".to_string()), Json(bind_req))
        .await
        .expect("bind succeeds");
    assert_eq!(bound.status, "bound");
    assert!(bound.webhook_url.is_some());

    let Json(binding) = devices::device_binding_handler(State(state.clone()), Path("prox-1".to_string()))
        .await
        .expect("binding lookup succeeds");
    assert_eq!(binding["status"], "running");

    let Json(accepted) = devices::webhook_handler(
        State(state.clone()),
        Path("prox-1".to_string()),
        Json(serde_json::json!({"temperature": 21.5})),
    )
    .await
    .expect("webhook delivery succeeds");
    assert_eq!(accepted.status, "accepted");

    devices::unbind_device_handler(State(state.clone()), Path("prox-1".to_string()))
        .await
        .expect("unbind succeeds");

    let err = devices::webhook_handler(
        State(state),
        Path("prox-1".to_string()),
        Json(serde_json::json!({"temperature": 21.5})),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_for_unregistered_device_is_not_found() {
    let (state, _dir) = test_server_state(10).await;

    let err = devices::webhook_handler(State(state), Path("nobody".to_string()), Json(serde_json::json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}
