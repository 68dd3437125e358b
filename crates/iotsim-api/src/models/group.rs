//! Request DTOs for the device-group endpoints.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    #[serde(rename = "modelId")]
    pub model_id: String,
    pub count: usize,
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
    #[serde(rename = "idPattern")]
    pub id_pattern: Option<String>,
    #[serde(rename = "staggerMs", default)]
    pub stagger_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartGroupQuery {
    #[serde(rename = "staggerMs")]
    pub stagger_ms: Option<u64>,
}
