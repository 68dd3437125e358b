use axum::extract::{Path, State};
use axum::response::Json;

use iotsim_api::handlers::{devices, stats};
use iotsim_api::models::device::CreateDeviceRequest;

use crate::common::{constant_sensor_model, test_server_state};

#[tokio::test]
async fn stats_reflect_running_device_counts() {
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

    let Json(idle) = stats::stats_handler(State(state.clone())).await.expect("stats succeed");
    assert_eq!(idle.running_devices, 0);

    devices::start_device_handler(State(state.clone()), Path("dev-1".to_string()))
        .await
        .unwrap();

    let Json(running) = stats::stats_handler(State(state)).await.expect("stats succeed");
    assert_eq!(running.running_devices, 1);
    assert_eq!(running.running_simulated, 1);
    assert_eq!(running.running_physical, 0);
}
