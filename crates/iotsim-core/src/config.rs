//! Environment-derived settings, mirroring the variable names documented in
//! the external interfaces section.

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub service_port: u16,
    pub log_level: String,

    pub mqtt_broker_host: String,
    pub mqtt_broker_port: u16,
    pub mqtt_use_tls: bool,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,

    pub max_devices_per_instance: usize,
    pub device_model_path: String,

    pub metrics_sink_url: Option<String>,
    pub metrics_sink_token: Option<String>,
    pub metrics_sink_org: String,
    pub metrics_sink_bucket: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            service_port: 8080,
            log_level: "info".to_string(),
            mqtt_broker_host: "localhost".to_string(),
            mqtt_broker_port: 1883,
            mqtt_use_tls: false,
            mqtt_username: None,
            mqtt_password: None,
            max_devices_per_instance: 10_000,
            device_model_path: "/app/device-models".to_string(),
            metrics_sink_url: None,
            metrics_sink_token: None,
            metrics_sink_org: "iotix".to_string(),
            metrics_sink_bucket: "telemetry".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            service_port: env_u16("SERVICE_PORT", defaults.service_port),
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            mqtt_broker_host: env::var("MQTT_BROKER_HOST").unwrap_or(defaults.mqtt_broker_host),
            mqtt_broker_port: env_u16("MQTT_BROKER_PORT", defaults.mqtt_broker_port),
            mqtt_use_tls: env_bool("MQTT_USE_TLS", defaults.mqtt_use_tls),
            mqtt_username: env::var("MQTT_USERNAME").ok(),
            mqtt_password: env::var("MQTT_PASSWORD").ok(),
            max_devices_per_instance: env_usize(
                "MAX_DEVICES_PER_INSTANCE",
                defaults.max_devices_per_instance,
            ),
            device_model_path: env::var("DEVICE_MODEL_PATH")
                .unwrap_or(defaults.device_model_path),
            metrics_sink_url: env::var("METRICS_SINK_URL").ok(),
            metrics_sink_token: env::var("METRICS_SINK_TOKEN").ok(),
            metrics_sink_org: env::var("METRICS_SINK_ORG").unwrap_or(defaults.metrics_sink_org),
            metrics_sink_bucket: env::var("METRICS_SINK_BUCKET")
                .unwrap_or(defaults.metrics_sink_bucket),
        }
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}
