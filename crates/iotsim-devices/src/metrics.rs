//! Non-blocking, fire-and-forget write port to an external time-series
//! sink. Every operation must never raise to the caller — failures are
//! logged and dropped so the engine keeps running; an unconfigured sink is
//! a silent no-op.

use std::collections::HashMap;

use async_trait::async_trait;
use iotsim_core::types::DeviceSource;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Engine-wide aggregate, written once per stats-task tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub running_devices: usize,
    pub running_simulated: usize,
    pub running_physical: usize,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_groups: usize,
}

#[async_trait]
pub trait MetricsWriter: Send + Sync {
    async fn write_telemetry(
        &self,
        device_id: &str,
        model_id: &str,
        group_id: Option<&str>,
        source: DeviceSource,
        fields: &HashMap<String, Value>,
    );

    async fn write_device_event(
        &self,
        device_id: &str,
        model_id: &str,
        group_id: Option<&str>,
        source: DeviceSource,
        event: &str,
    );

    async fn write_engine_stats(&self, stats: &EngineStats);

    async fn write_connection_metric(
        &self,
        device_id: &str,
        model_id: &str,
        group_id: Option<&str>,
        source: DeviceSource,
        connected: bool,
        latency_ms: Option<u64>,
    );
}

/// Coerce a telemetry payload into point fields: numbers to `f64`, booleans
/// and strings passed through, `deviceId`/`timestamp` dropped because they
/// are already point tags, not fields.
pub fn coerce_fields(payload: &Value) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    if let Value::Object(map) = payload {
        for (key, value) in map {
            if key == "deviceId" || key == "timestamp" {
                continue;
            }
            let coerced = match value {
                Value::Number(n) => n.as_f64().map(|f| {
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }),
                other => Some(other.clone()),
            };
            if let Some(v) = coerced {
                fields.insert(key.clone(), v);
            }
        }
    }
    fields
}

/// Silent no-op sink used when no metrics backend is configured.
pub struct NoopMetricsWriter;

#[async_trait]
impl MetricsWriter for NoopMetricsWriter {
    async fn write_telemetry(
        &self,
        _device_id: &str,
        _model_id: &str,
        _group_id: Option<&str>,
        _source: DeviceSource,
        _fields: &HashMap<String, Value>,
    ) {
    }

    async fn write_device_event(
        &self,
        _device_id: &str,
        _model_id: &str,
        _group_id: Option<&str>,
        _source: DeviceSource,
        _event: &str,
    ) {
    }

    async fn write_engine_stats(&self, _stats: &EngineStats) {}

    async fn write_connection_metric(
        &self,
        _device_id: &str,
        _model_id: &str,
        _group_id: Option<&str>,
        _source: DeviceSource,
        _connected: bool,
        _latency_ms: Option<u64>,
    ) {
    }
}

/// HTTP line-protocol-style writer that POSTs one JSON document per write
/// to a configured sink URL. Errors are logged and swallowed — never
/// propagated to the caller, per the metrics writer contract.
pub struct HttpMetricsWriter {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    org: String,
    bucket: String,
}

impl HttpMetricsWriter {
    pub fn new(url: String, token: Option<String>, org: String, bucket: String) -> Self {
        HttpMetricsWriter {
            client: reqwest::Client::new(),
            url,
            token,
            org,
            bucket,
        }
    }

    async fn send(&self, point: Value) {
        let mut request = self.client.post(&self.url).json(&point);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Err(e) = request.send().await {
            warn!("metrics sink write failed, dropping point: {e}");
        }
    }
}

#[async_trait]
impl MetricsWriter for HttpMetricsWriter {
    async fn write_telemetry(
        &self,
        device_id: &str,
        model_id: &str,
        group_id: Option<&str>,
        source: DeviceSource,
        fields: &HashMap<String, Value>,
    ) {
        self.send(serde_json::json!({
            "measurement": "telemetry",
            "org": self.org,
            "bucket": self.bucket,
            "deviceId": device_id,
            "modelId": model_id,
            "groupId": group_id,
            "source": source.as_str(),
            "fields": fields,
        }))
        .await;
    }

    async fn write_device_event(
        &self,
        device_id: &str,
        model_id: &str,
        group_id: Option<&str>,
        source: DeviceSource,
        event: &str,
    ) {
        self.send(serde_json::json!({
            "measurement": "device_event",
            "org": self.org,
            "bucket": self.bucket,
            "deviceId": device_id,
            "modelId": model_id,
            "groupId": group_id,
            "source": source.as_str(),
            "event": event,
        }))
        .await;
    }

    async fn write_engine_stats(&self, stats: &EngineStats) {
        self.send(serde_json::json!({
            "measurement": "engine_stats",
            "org": self.org,
            "bucket": self.bucket,
            "stats": stats,
        }))
        .await;
    }

    async fn write_connection_metric(
        &self,
        device_id: &str,
        model_id: &str,
        group_id: Option<&str>,
        source: DeviceSource,
        connected: bool,
        latency_ms: Option<u64>,
    ) {
        self.send(serde_json::json!({
            "measurement": "connection",
            "org": self.org,
            "bucket": self.bucket,
            "deviceId": device_id,
            "modelId": model_id,
            "groupId": group_id,
            "source": source.as_str(),
            "connected": connected,
            "latencyMs": latency_ms,
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_fields_drops_reserved_keys() {
        let payload = serde_json::json!({
            "deviceId": "dev-1",
            "timestamp": "2024-01-01T00:00:00Z",
            "temperature": 21.5,
            "ok": true,
            "label": "north",
        });
        let fields = coerce_fields(&payload);
        assert!(!fields.contains_key("deviceId"));
        assert!(!fields.contains_key("timestamp"));
        assert_eq!(fields.get("temperature"), Some(&serde_json::json!(21.5)));
        assert_eq!(fields.get("ok"), Some(&serde_json::json!(true)));
        assert_eq!(fields.get("label"), Some(&serde_json::json!("north")));
    }

    #[tokio::test]
    async fn noop_writer_never_panics() {
        let writer = NoopMetricsWriter;
        writer
            .write_telemetry("d", "m", None, DeviceSource::Simulated, &HashMap::new())
            .await;
        writer
            .write_device_event("d", "m", None, DeviceSource::Simulated, "started")
            .await;
        writer
            .write_engine_stats(&EngineStats {
                running_devices: 0,
                running_simulated: 0,
                running_physical: 0,
                total_messages: 0,
                total_bytes: 0,
                active_groups: 0,
            })
            .await;
        writer
            .write_connection_metric("d", "m", None, DeviceSource::Simulated, true, Some(12))
            .await;
    }
}
