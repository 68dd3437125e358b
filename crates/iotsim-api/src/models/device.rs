//! Request DTOs for the devices and webhooks endpoints.

use iotsim_core::types::DeviceStatus;
use iotsim_devices::model::ConnectionConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeviceRequest {
    #[serde(rename = "modelId")]
    pub model_id: String,
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
    #[serde(rename = "overrideConnection")]
    pub override_connection: Option<ConnectionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceListQuery {
    pub status: Option<DeviceStatus>,
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
    #[serde(rename = "modelId")]
    pub model_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size", rename = "pageSize")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}
fn default_page_size() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindDeviceRequest {
    pub config: iotsim_devices::BindingConfig,
}
