//! Router assembly, shared state, and the serve loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;
use iotsim_devices::{DeviceManager, ModelRegistry};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{devices, groups, health, models, stats};
use crate::openapi;

/// Everything a handler needs, cloned per request. `manager` and `registry`
/// are themselves cheaply-cloneable handles (`Arc`/internal `Arc<RwLock<_>>`),
/// so this struct stays `Clone` without wrapping itself in an `Arc`.
#[derive(Clone)]
pub struct ServerState {
    pub manager: Arc<DeviceManager>,
    pub registry: ModelRegistry,
    start_time: Instant,
}

impl ServerState {
    pub fn new(manager: Arc<DeviceManager>, registry: ModelRegistry) -> Self {
        ServerState {
            manager,
            registry,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub fn create_router(state: ServerState) -> Router {
    let api_routes = Router::new()
        .route("/models", get(models::list_models_handler).post(models::create_model_handler))
        .route("/models/:model_id", get(models::get_model_handler))
        .route(
            "/devices",
            get(devices::list_devices_handler).post(devices::create_device_handler),
        )
        .route(
            "/devices/:device_id",
            get(devices::get_device_handler).delete(devices::delete_device_handler),
        )
        .route("/devices/:device_id/start", post(devices::start_device_handler))
        .route("/devices/:device_id/stop", post(devices::stop_device_handler))
        .route("/devices/:device_id/metrics", get(devices::device_metrics_handler))
        .route("/devices/:device_id/bind", post(devices::bind_device_handler))
        .route("/devices/:device_id/unbind", post(devices::unbind_device_handler))
        .route("/devices/:device_id/binding", get(devices::device_binding_handler))
        .route("/webhooks/:device_id", post(devices::webhook_handler))
        .route("/groups", post(groups::create_group_handler))
        .route("/groups/:group_id/start", post(groups::start_group_handler))
        .route("/groups/:group_id/stop", post(groups::stop_group_handler))
        .route("/groups/:group_id", delete(groups::delete_group_handler))
        .route("/groups/:group_id/dropout", post(groups::dropout_group_handler))
        .route("/stats", get(stats::stats_handler));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        .route("/api/openapi.json", get(openapi::openapi_json_handler))
        .nest("/api/v1", api_routes)
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `addr` and serves `state` until a shutdown signal arrives, then
/// drains the device manager before returning.
pub async fn run(addr: SocketAddr, state: ServerState) -> anyhow::Result<()> {
    let manager = state.manager.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "device simulation engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown signal received, draining devices");
    manager.shutdown().await;
    tracing::info!("device simulation engine shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
