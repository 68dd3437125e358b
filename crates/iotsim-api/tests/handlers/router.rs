//! Router-level tests: unlike the rest of this suite, which calls handler
//! functions directly, these drive `create_router` over a real HTTP request
//! via `tower::ServiceExt::oneshot` — exercising route wiring and the
//! `TraceLayer`/`CompressionLayer`/`CorsLayer` middleware stack together,
//! not just one handler in isolation.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use iotsim_api::server::create_router;

use crate::common::test_server_state;

#[tokio::test]
async fn health_route_reachable_through_the_full_router() {
    let (state, _dir) = test_server_state(10).await;
    let router = create_router(state);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .expect("router serves the request");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_device_returns_404_through_the_full_router() {
    let (state, _dir) = test_server_state(10).await;
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/devices/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("router serves the request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
