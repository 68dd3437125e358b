//! Request and response models for the HTTP control surface.

pub mod device;
pub mod error;
pub mod group;
pub mod pagination;

pub use error::ErrorResponse;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub device_count: usize,
    pub running_device_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAcceptedResponse {
    pub status: &'static str,
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindResponse {
    pub device_id: String,
    pub status: &'static str,
    pub binding: iotsim_devices::BindingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}
