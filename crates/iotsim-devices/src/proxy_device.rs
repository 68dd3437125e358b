//! Proxy device: the passive counterpart to `VirtualDevice`. Holds no
//! generators and never publishes — it binds an inbound proxy adapter,
//! counts what arrives, and republishes every payload to the metrics sink
//! tagged `source=physical`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use iotsim_core::types::{ConnectionState, DeviceSource, DeviceStatus, Protocol};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::adapter::AdapterError;
use crate::adapters::proxy::{HttpProxyAdapter, MqttProxyAdapter, ProxyAdapter};
use crate::metrics::{coerce_fields, MetricsWriter};
use crate::webhook::WebhookRegistry;

/// What a caller supplies to `bind`. `protocol` selects the concrete proxy
/// adapter; `broker`/`port`/`topic`/`qos` only matter for the MQTT variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    pub protocol: Protocol,
    pub broker: Option<String>,
    pub port: Option<u16>,
    pub topic: Option<String>,
    #[serde(default = "default_qos")]
    pub qos: u8,
}

fn default_qos() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCountersSnapshot {
    pub messages_received: u64,
    pub bytes_received: u64,
    pub error_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDeviceSnapshot {
    pub device_id: String,
    pub model_id: String,
    pub group_id: Option<String>,
    pub status: DeviceStatus,
    pub connection_state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_telemetry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub counters: ProxyCountersSnapshot,
    pub binding: Option<BindingConfig>,
    pub webhook_url: Option<String>,
}

#[derive(Default)]
struct ProxyCounters {
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    error_count: AtomicU64,
}

impl ProxyCounters {
    fn snapshot(&self) -> ProxyCountersSnapshot {
        ProxyCountersSnapshot {
            messages_received: self.messages_received.load(Ordering::SeqCst),
            bytes_received: self.bytes_received.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }
}

/// Passive, bindable instance. `messagesSent`/`bytesSent` are zero by
/// definition — there is no outbound leg.
pub struct ProxyDevice {
    pub device_id: String,
    pub model_id: String,
    pub group_id: Option<String>,

    status: RwLock<DeviceStatus>,
    connection_state: RwLock<ConnectionState>,
    created_at: DateTime<Utc>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    last_telemetry_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,
    counters: ProxyCounters,

    binding: RwLock<Option<BindingConfig>>,
    webhook_url: RwLock<Option<String>>,
    adapter: RwLock<Option<Arc<dyn ProxyAdapter>>>,

    webhook_registry: WebhookRegistry,
    metrics: Arc<dyn MetricsWriter>,
}

impl ProxyDevice {
    pub fn new(
        device_id: String,
        model_id: String,
        group_id: Option<String>,
        webhook_registry: WebhookRegistry,
        metrics: Arc<dyn MetricsWriter>,
    ) -> Self {
        ProxyDevice {
            device_id,
            model_id,
            group_id,
            status: RwLock::new(DeviceStatus::Created),
            connection_state: RwLock::new(ConnectionState::Disconnected),
            created_at: Utc::now(),
            started_at: RwLock::new(None),
            last_telemetry_at: RwLock::new(None),
            error_message: RwLock::new(None),
            counters: ProxyCounters::default(),
            binding: RwLock::new(None),
            webhook_url: RwLock::new(None),
            adapter: RwLock::new(None),
            webhook_registry,
            metrics,
        }
    }

    pub async fn status(&self) -> DeviceStatus {
        *self.status.read().await
    }

    pub async fn snapshot(&self) -> ProxyDeviceSnapshot {
        ProxyDeviceSnapshot {
            device_id: self.device_id.clone(),
            model_id: self.model_id.clone(),
            group_id: self.group_id.clone(),
            status: *self.status.read().await,
            connection_state: *self.connection_state.read().await,
            created_at: self.created_at,
            started_at: *self.started_at.read().await,
            last_telemetry_at: *self.last_telemetry_at.read().await,
            error_message: self.error_message.read().await.clone(),
            counters: self.counters.snapshot(),
            binding: self.binding.read().await.clone(),
            webhook_url: self.webhook_url.read().await.clone(),
        }
    }

    fn build_adapter(self: &Arc<Self>, config: &BindingConfig) -> Result<Arc<dyn ProxyAdapter>, AdapterError> {
        match config.protocol {
            Protocol::Mqtt => {
                let broker = config
                    .broker
                    .clone()
                    .ok_or_else(|| AdapterError::Configuration("mqtt proxy binding requires broker".into()))?;
                let topic = config
                    .topic
                    .clone()
                    .ok_or_else(|| AdapterError::Configuration("mqtt proxy binding requires topic".into()))?;
                Ok(Arc::new(MqttProxyAdapter::new(
                    self.device_id.clone(),
                    broker,
                    config.port.unwrap_or(1883),
                    topic,
                    config.qos,
                )))
            }
            Protocol::Http => Ok(Arc::new(HttpProxyAdapter::new(
                self.device_id.clone(),
                self.webhook_registry.clone(),
            ))),
            Protocol::Coap => Err(AdapterError::Configuration(
                "coap proxy binding is not supported".into(),
            )),
        }
    }

    /// Bind an inbound stream and start counting what arrives. Mirrors
    /// `VirtualDevice::start`'s status transitions, minus the telemetry
    /// tasks — there is nothing to publish here.
    pub async fn bind(self: &Arc<Self>, config: BindingConfig) -> Result<Option<String>, AdapterError> {
        if matches!(*self.status.read().await, DeviceStatus::Running) {
            return Ok(self.webhook_url.read().await.clone());
        }

        *self.status.write().await = DeviceStatus::Starting;
        *self.error_message.write().await = None;
        *self.connection_state.write().await = ConnectionState::Connecting;

        let adapter = match self.build_adapter(&config) {
            Ok(a) => a,
            Err(e) => {
                *self.status.write().await = DeviceStatus::Error;
                *self.connection_state.write().await = ConnectionState::Disconnected;
                *self.error_message.write().await = Some(e.to_string());
                self.counters.error_count.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        let device = self.clone();
        let callback: Arc<dyn Fn(Value) + Send + Sync> = Arc::new(move |payload| {
            let device = device.clone();
            tokio::spawn(async move {
                device.on_telemetry(payload).await;
            });
        });

        match adapter.bind(callback).await {
            Ok(webhook_url) => {
                *self.adapter.write().await = Some(adapter);
                *self.binding.write().await = Some(config);
                *self.webhook_url.write().await = webhook_url.clone();
                *self.connection_state.write().await = ConnectionState::Connected;
                *self.status.write().await = DeviceStatus::Running;
                *self.started_at.write().await = Some(Utc::now());
                self.metrics
                    .write_device_event(
                        &self.device_id,
                        &self.model_id,
                        self.group_id.as_deref(),
                        DeviceSource::Physical,
                        "started",
                    )
                    .await;
                tracing::info!(device_id = %self.device_id, "proxy device bound");
                Ok(webhook_url)
            }
            Err(e) => {
                *self.status.write().await = DeviceStatus::Error;
                *self.connection_state.write().await = ConnectionState::Disconnected;
                *self.error_message.write().await = Some(e.to_string());
                self.counters.error_count.fetch_add(1, Ordering::SeqCst);
                tracing::error!(device_id = %self.device_id, error = %e, "proxy device bind failed");
                Err(e)
            }
        }
    }

    async fn on_telemetry(&self, payload: Value) {
        let len = serde_json::to_vec(&payload).map(|b| b.len()).unwrap_or(0) as u64;
        self.counters.messages_received.fetch_add(1, Ordering::SeqCst);
        self.counters.bytes_received.fetch_add(len, Ordering::SeqCst);
        *self.last_telemetry_at.write().await = Some(Utc::now());

        let fields = coerce_fields(&payload);
        self.metrics
            .write_telemetry(
                &self.device_id,
                &self.model_id,
                self.group_id.as_deref(),
                DeviceSource::Physical,
                &fields,
            )
            .await;
    }

    pub async fn unbind(self: &Arc<Self>) -> Result<(), AdapterError> {
        if matches!(*self.status.read().await, DeviceStatus::Stopped) {
            return Ok(());
        }
        if let Some(adapter) = self.adapter.write().await.take() {
            adapter.unbind().await?;
        }
        *self.binding.write().await = None;
        *self.webhook_url.write().await = None;
        *self.connection_state.write().await = ConnectionState::Disconnected;
        *self.status.write().await = DeviceStatus::Stopped;
        self.metrics
            .write_device_event(
                &self.device_id,
                &self.model_id,
                self.group_id.as_deref(),
                DeviceSource::Physical,
                "stopped",
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_http_registers_webhook_and_unbind_removes_it() {
        let registry = WebhookRegistry::new();
        let device = Arc::new(ProxyDevice::new(
            "p-1".to_string(),
            "p".to_string(),
            None,
            registry.clone(),
            Arc::new(crate::metrics::NoopMetricsWriter),
        ));

        let config = BindingConfig {
            protocol: Protocol::Http,
            broker: None,
            port: None,
            topic: None,
            qos: 1,
        };
        let webhook_url = device.bind(config).await.expect("http bind succeeds");
        assert_eq!(webhook_url, Some("/api/v1/webhooks/p-1".to_string()));
        assert!(registry.is_bound("p-1"));
        assert_eq!(device.status().await, DeviceStatus::Running);

        device.unbind().await.expect("unbind succeeds");
        assert!(!registry.is_bound("p-1"));
        assert_eq!(device.status().await, DeviceStatus::Stopped);
    }

    #[tokio::test]
    async fn telemetry_through_webhook_increments_counters() {
        let registry = WebhookRegistry::new();
        let device = Arc::new(ProxyDevice::new(
            "p-2".to_string(),
            "p".to_string(),
            None,
            registry.clone(),
            Arc::new(crate::metrics::NoopMetricsWriter),
        ));
        let config = BindingConfig {
            protocol: Protocol::Http,
            broker: None,
            port: None,
            topic: None,
            qos: 1,
        };
        device.bind(config).await.expect("bind succeeds");

        assert!(registry.invoke("p-2", serde_json::json!({"v": 1})));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let snapshot = device.snapshot().await;
        assert_eq!(snapshot.counters.messages_received, 1);
        assert!(snapshot.counters.bytes_received > 0);
        assert!(snapshot.last_telemetry_at.is_some());
    }

    #[tokio::test]
    async fn mqtt_binding_without_broker_fails_configuration() {
        let registry = WebhookRegistry::new();
        let device = Arc::new(ProxyDevice::new(
            "p-3".to_string(),
            "p".to_string(),
            None,
            registry,
            Arc::new(crate::metrics::NoopMetricsWriter),
        ));
        let config = BindingConfig {
            protocol: Protocol::Mqtt,
            broker: None,
            port: None,
            topic: Some("ext/x".to_string()),
            qos: 1,
        };
        let result = device.bind(config).await;
        assert!(result.is_err());
        assert_eq!(device.status().await, DeviceStatus::Error);
    }
}
