use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;

use iotsim_api::handlers::groups;
use iotsim_api::models::group::{CreateGroupRequest, StartGroupQuery};
use iotsim_devices::{DropoutConfig, DropoutStrategyConfig, LaunchConfig};

use crate::common::{constant_sensor_model, test_server_state};

fn group_req(model_id: &str, count: usize, stagger_ms: u64) -> CreateGroupRequest {
    CreateGroupRequest {
        model_id: model_id.to_string(),
        count,
        group_id: Some("g1".to_string()),
        id_pattern: None,
        stagger_ms,
    }
}

#[tokio::test]
async fn create_group_populates_indexed_device_ids() {
    let (state, _dir) = test_server_state(50).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();

    let (status, Json(created)) = groups::create_group_handler(State(state), Json(group_req("sensor-1", 3, 0)))
        .await
        .expect("group creation succeeds");

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.group_id, "g1");
    assert_eq!(created.device_ids.len(), 3);
    assert!(created.device_ids.contains(&"g1-0".to_string()));
    assert!(created.device_ids.contains(&"g1-2".to_string()));
}

/// End-to-end scenario: start a group with the immediate launch strategy
/// and confirm every member transitions to running.
#[tokio::test]
async fn start_group_immediate_starts_all_members() {
    let (state, _dir) = test_server_state(50).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();
    groups::create_group_handler(State(state.clone()), Json(group_req("sensor-1", 4, 0)))
        .await
        .unwrap();

    let Json(summary) = groups::start_group_handler(
        State(state.clone()),
        Path("g1".to_string()),
        Query(StartGroupQuery { stagger_ms: None }),
        None,
    )
    .await
    .expect("start succeeds");

    assert_eq!(summary.group_id, "g1");
    assert_eq!(summary.total, 4);
    assert_eq!(summary.devices_affected, 4);

    let Json(stop_summary) = groups::stop_group_handler(State(state), Path("g1".to_string()))
        .await
        .expect("stop succeeds");
    assert_eq!(stop_summary.devices_affected, 4);
}

/// `staggerMs` query param with no body selects the Linear launch strategy.
#[tokio::test]
async fn start_group_via_stagger_query_param_uses_linear_launch() {
    let (state, _dir) = test_server_state(50).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();
    groups::create_group_handler(State(state.clone()), Json(group_req("sensor-1", 2, 0)))
        .await
        .unwrap();

    let Json(summary) = groups::start_group_handler(
        State(state),
        Path("g1".to_string()),
        Query(StartGroupQuery { stagger_ms: Some(5) }),
        None,
    )
    .await
    .expect("start succeeds");

    assert_eq!(summary.devices_affected, 2);
}

/// A `LaunchConfig` body takes precedence over the query param.
#[tokio::test]
async fn start_group_body_overrides_query_param() {
    let (state, _dir) = test_server_state(50).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();
    groups::create_group_handler(State(state.clone()), Json(group_req("sensor-1", 3, 0)))
        .await
        .unwrap();

    let Json(summary) = groups::start_group_handler(
        State(state),
        Path("g1".to_string()),
        Query(StartGroupQuery { stagger_ms: Some(999) }),
        Some(Json(LaunchConfig::Batch { batch_size: 2, delay_ms: 5 })),
    )
    .await
    .expect("start succeeds");

    assert_eq!(summary.devices_affected, 3);
}

#[tokio::test]
async fn dropout_immediate_stops_requested_count() {
    let (state, _dir) = test_server_state(50).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();
    groups::create_group_handler(State(state.clone()), Json(group_req("sensor-1", 5, 0)))
        .await
        .unwrap();
    groups::start_group_handler(
        State(state.clone()),
        Path("g1".to_string()),
        Query(StartGroupQuery { stagger_ms: None }),
        None,
    )
    .await
    .unwrap();

    let Json(summary) = groups::dropout_group_handler(
        State(state),
        Path("g1".to_string()),
        Json(DropoutConfig {
            strategy: DropoutStrategyConfig::Immediate,
            count: Some(2),
            percentage: None,
            delay_ms: 0,
            base: 2.0,
            duration_ms: 0,
            reconnect: false,
            reconnect_delay_ms: 0,
        }),
    )
    .await
    .expect("dropout succeeds");

    assert_eq!(summary.devices_affected, 2);
    assert_eq!(summary.status, "completed");
}

#[tokio::test]
async fn delete_group_removes_all_members() {
    let (state, _dir) = test_server_state(50).await;
    state.registry.register(constant_sensor_model("sensor-1", 1000)).await.unwrap();
    groups::create_group_handler(State(state.clone()), Json(group_req("sensor-1", 2, 0)))
        .await
        .unwrap();

    groups::delete_group_handler(State(state.clone()), Path("g1".to_string()))
        .await
        .expect("delete succeeds");

    let err = groups::stop_group_handler(State(state), Path("g1".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_group_rejects_unknown_group() {
    let (state, _dir) = test_server_state(10).await;

    let err = groups::start_group_handler(
        State(state),
        Path("ghost".to_string()),
        Query(StartGroupQuery { stagger_ms: None }),
        None,
    )
    .await
    .unwrap_err();

    assert_eq!(err.status, StatusCode::NOT_FOUND);
}
