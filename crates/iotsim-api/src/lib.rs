//! HTTP control surface for the device simulation engine.
//!
//! Thin translation layer: validates request bodies into the typed configs
//! `iotsim-devices` already understands, forwards to the `DeviceManager`, and
//! maps domain errors onto the status codes documented for the REST API.

pub mod handlers;
pub mod models;
pub mod openapi;
pub mod server;

pub use models::error::ErrorResponse;
pub use server::{create_router, run, ServerState};
