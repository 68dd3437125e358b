use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;

use iotsim_api::handlers::models;

use crate::common::{constant_sensor_model, test_server_state};

#[tokio::test]
async fn create_then_list_then_get_model_round_trips() {
    let (state, _dir) = test_server_state(10).await;

    let (status, Json(created)) =
        models::create_model_handler(State(state.clone()), Json(constant_sensor_model("sensor-1", 1000)))
            .await
            .expect("create succeeds");
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.id, "sensor-1");

    let Json(listed) = models::list_models_handler(State(state.clone())).await.expect("list succeeds");
    assert_eq!(listed.len(), 1);

    let Json(fetched) = models::get_model_handler(State(state), Path("sensor-1".to_string()))
        .await
        .expect("get succeeds");
    assert_eq!(fetched.id, "sensor-1");
    assert_eq!(fetched.telemetry.len(), 1);
}

#[tokio::test]
async fn create_model_rejects_duplicate_id() {
    let (state, _dir) = test_server_state(10).await;
    models::create_model_handler(State(state.clone()), Json(constant_sensor_model("sensor-1", 1000)))
        .await
        .expect("first create succeeds");

    let err = models::create_model_handler(State(state), Json(constant_sensor_model("sensor-1", 1000)))
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_unknown_model_is_not_found() {
    let (state, _dir) = test_server_state(10).await;

    let err = models::get_model_handler(State(state), Path("ghost".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::NOT_FOUND);
}
