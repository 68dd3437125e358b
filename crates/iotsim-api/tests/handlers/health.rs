use axum::extract::{Path, State};
use axum::response::Json;

use iotsim_api::handlers::devices;
use iotsim_api::handlers::health;
use iotsim_api::models::device::CreateDeviceRequest;

use crate::common::{constant_sensor_model, test_server_state};

#[tokio::test]
async fn health_reports_zero_devices_on_a_fresh_engine() {
    let (state, _dir) = test_server_state(10).await;

    let Json(health) = health::health_handler(State(state)).await;

    assert_eq!(health.status, "ok");
    assert_eq!(health.device_count, 0);
    assert_eq!(health.running_device_count, 0);
}

#[tokio::test]
async fn health_counts_created_vs_running_devices_separately() {
    let (state, _dir) = test_server_state(10).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();

    devices::create_device_handler(
        State(state.clone()),
        Json(CreateDeviceRequest {
            model_id: "sensor-1".to_string(),
            device_id: Some("dev-1".to_string()),
            group_id: None,
            override_connection: None,
        }),
    )
    .await
    .unwrap();

    let Json(before_start) = health::health_handler(State(state.clone())).await;
    assert_eq!(before_start.device_count, 1);
    assert_eq!(before_start.running_device_count, 0);

    devices::start_device_handler(State(state.clone()), Path("dev-1".to_string()))
        .await
        .unwrap();

    let Json(after_start) = health::health_handler(State(state)).await;
    assert_eq!(after_start.device_count, 1);
    assert_eq!(after_start.running_device_count, 1);
}

#[tokio::test]
async fn ready_handler_reports_ready() {
    let (state, _dir) = test_server_state(10).await;

    let Json(ready) = health::ready_handler(State(state)).await;

    assert_eq!(ready.status, "ready");
}
