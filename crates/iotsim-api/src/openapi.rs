//! OpenAPI document and Swagger UI mount for the control surface.

use axum::http::header;
use axum::response::IntoResponse;
use utoipa::openapi::OpenApi as OpenApiDoc;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct ServerModifier;

impl Modify for ServerModifier {
    fn modify(&self, openapi: &mut OpenApiDoc) {
        openapi.info.title = "Virtual IoT Device Simulation Engine".to_string();
        openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
        openapi.info.description = Some(
            "Control surface for launching and driving virtual and proxy IoT devices: \
             device models, device and group lifecycle, dropout simulation, and webhook \
             ingestion for physical devices bound over HTTP."
                .to_string(),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&ServerModifier),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "models", description = "Device model catalogue"),
        (name = "devices", description = "Device CRUD, lifecycle, and proxy binding"),
        (name = "groups", description = "Bulk device-group lifecycle and dropout simulation"),
        (name = "stats", description = "Engine-wide aggregate statistics"),
    )
)]
pub struct ApiDoc;

/// Mounts `/api-docs/*` (Swagger UI) backed by the JSON document at
/// `/api/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/api-docs{/spec}").url("/api/openapi.json", ApiDoc::openapi())
}

pub async fn openapi_json_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json;charset=utf-8")],
        openapi_json(),
    )
}

pub fn openapi_json() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}
