//! Shared handler utilities: the `Result` alias every handler returns.
//!
//! Response bodies are the flat JSON shapes documented for the REST API —
//! no `{success,data}` envelope — since end-to-end scenarios assert
//! directly against top-level fields (`messagesSent`, `lastTelemetry.t`,
//! ...). Errors still go through `ErrorResponse`'s own envelope.

use axum::response::Json;

use crate::models::ErrorResponse;

pub type HandlerResult<T> = Result<Json<T>, ErrorResponse>;

pub fn ok<T>(data: T) -> HandlerResult<T> {
    Ok(Json(data))
}
