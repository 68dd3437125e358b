//! Device model configuration: the immutable template a `VirtualDevice` or
//! `ProxyDevice` is instantiated from.

use std::collections::HashMap;

use iotsim_core::types::{DeviceType, Distribution, Protocol};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeneratorConfig {
    Random {
        min: f64,
        max: f64,
        #[serde(default = "default_distribution")]
        distribution: Distribution,
        mean: Option<f64>,
        stddev: Option<f64>,
        rate: Option<f64>,
    },
    Sequence {
        start: f64,
        #[serde(default = "default_step")]
        step: f64,
        min: Option<f64>,
        max: Option<f64>,
        #[serde(default)]
        wrap: bool,
    },
    Constant {
        value: serde_json::Value,
    },
    Replay {
        #[serde(rename = "dataFile")]
        data_file: String,
        #[serde(rename = "loopReplay", default = "default_true")]
        loop_replay: bool,
    },
    Sine {
        min: f64,
        max: f64,
        #[serde(rename = "periodMs")]
        period_ms: u64,
        #[serde(default)]
        phase: f64,
    },
}

fn default_distribution() -> Distribution {
    Distribution::Uniform
}
fn default_step() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryAttributeConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,
    pub unit: Option<String>,
    pub generator: GeneratorConfig,
    #[serde(rename = "intervalMs", default = "default_interval_ms")]
    pub interval_ms: u64,
    pub topic: Option<String>,
}

fn default_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub broker: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: Option<bool>,
    #[serde(rename = "clientIdPattern")]
    pub client_id_pattern: Option<String>,
    #[serde(rename = "topicPattern")]
    pub topic_pattern: Option<String>,
    pub qos: Option<u8>,
    #[serde(rename = "keepAlive")]
    pub keep_alive: Option<u64>,
    #[serde(rename = "cleanSession")]
    pub clean_session: Option<bool>,
    pub username: Option<String>,
    #[serde(rename = "passwordRef")]
    pub password_ref: Option<String>,
}

impl ConnectionConfig {
    /// Field-wise merge: `self` (the override) wins per field when set,
    /// otherwise fall back to `base` (the model's default connection).
    pub fn merge_over(&self, base: &ConnectionConfig) -> ConnectionConfig {
        ConnectionConfig {
            broker: self.broker.clone().or_else(|| base.broker.clone()),
            port: self.port.or(base.port),
            tls: self.tls.or(base.tls),
            client_id_pattern: self
                .client_id_pattern
                .clone()
                .or_else(|| base.client_id_pattern.clone()),
            topic_pattern: self
                .topic_pattern
                .clone()
                .or_else(|| base.topic_pattern.clone()),
            qos: self.qos.or(base.qos),
            keep_alive: self.keep_alive.or(base.keep_alive),
            clean_session: self.clean_session.or(base.clean_session),
            username: self.username.clone().or_else(|| base.username.clone()),
            password_ref: self
                .password_ref
                .clone()
                .or_else(|| base.password_ref.clone()),
        }
    }

    /// Resolve documented defaults for whichever fields remain unset after
    /// merging, per the protocol in use.
    pub fn with_defaults(&self, protocol: Protocol) -> ResolvedConnection {
        let default_port = match protocol {
            Protocol::Mqtt => 1883,
            Protocol::Http => 80,
            Protocol::Coap => 5683,
        };
        ResolvedConnection {
            broker: self.broker.clone().unwrap_or_else(|| "localhost".into()),
            port: self.port.unwrap_or(default_port),
            tls: self.tls.unwrap_or(false),
            client_id_pattern: self.client_id_pattern.clone(),
            topic_pattern: self.topic_pattern.clone(),
            qos: self.qos.unwrap_or(1),
            keep_alive: self.keep_alive.unwrap_or(60),
            clean_session: self.clean_session.unwrap_or(true),
            username: self.username.clone(),
            password_ref: self.password_ref.clone(),
        }
    }
}

/// A `ConnectionConfig` with every documented default already applied.
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub broker: String,
    pub port: u16,
    pub tls: bool,
    pub client_id_pattern: Option<String>,
    pub topic_pattern: Option<String>,
    pub qos: u8,
    pub keep_alive: u64,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceModelConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub protocol: Protocol,
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,
    #[serde(default)]
    pub telemetry: Vec<TelemetryAttributeConfig>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}
