//! Virtual device: per-device state machine, telemetry loop set, adapter
//! lifecycle and counters.
//!
//! The manager always holds devices behind an `Arc`, which is what lets a
//! spawned telemetry task hold a real `Arc<VirtualDevice>` clone rather than
//! a borrow with a lifetime tied to the device's own methods.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use iotsim_core::types::{ConnectionState, DeviceSource, DeviceStatus, Protocol};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapter::{AdapterError, Payload, ProtocolAdapter};
use crate::generators::{self, Generator};
use crate::metrics::{coerce_fields, MetricsWriter};
use crate::model::{DeviceModelConfig, ResolvedConnection, TelemetryAttributeConfig};
use crate::template::{self, TemplateContext};

#[derive(Debug, Default)]
pub struct DeviceCounters {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub error_count: AtomicU64,
}

impl DeviceCounters {
    pub fn snapshot(&self) -> DeviceCountersSnapshot {
        DeviceCountersSnapshot {
            messages_sent: self.messages_sent.load(Ordering::SeqCst),
            messages_received: self.messages_received.load(Ordering::SeqCst),
            bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
            bytes_received: self.bytes_received.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCountersSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error_count: u64,
}

/// Runtime state the manager exposes through the control API. Cloned out of
/// the live device on every read — readers never hold device internals.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub model_id: String,
    pub group_id: Option<String>,
    pub status: DeviceStatus,
    pub connection_state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_telemetry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub counters: DeviceCountersSnapshot,
    pub last_telemetry: HashMap<String, Value>,
}

/// One running instance of a `DeviceModelConfig`. The manager owns the
/// device exclusively (always behind an `Arc` so telemetry tasks can hold a
/// real clone); the device owns its adapter and generator set exclusively.
pub struct VirtualDevice {
    pub device_id: String,
    pub model_id: String,
    pub group_id: Option<String>,
    pub protocol: Protocol,
    pub connection: ResolvedConnection,
    pub telemetry: Vec<TelemetryAttributeConfig>,

    status: RwLock<DeviceStatus>,
    connection_state: RwLock<ConnectionState>,
    created_at: DateTime<Utc>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    last_telemetry_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,
    counters: DeviceCounters,
    last_telemetry: RwLock<HashMap<String, Value>>,
    custom_state: RwLock<HashMap<String, Value>>,

    adapter: RwLock<Option<Arc<dyn ProtocolAdapter>>>,
    tasks: RwLock<Vec<JoinHandle<()>>>,
    cancel: RwLock<Option<CancellationToken>>,

    metrics: Arc<dyn MetricsWriter>,
}

impl VirtualDevice {
    pub fn new(
        device_id: String,
        model: &DeviceModelConfig,
        group_id: Option<String>,
        connection: ResolvedConnection,
        metrics: Arc<dyn MetricsWriter>,
    ) -> Self {
        VirtualDevice {
            device_id,
            model_id: model.id.clone(),
            group_id,
            protocol: model.protocol,
            connection,
            telemetry: model.telemetry.clone(),
            status: RwLock::new(DeviceStatus::Created),
            connection_state: RwLock::new(ConnectionState::Disconnected),
            created_at: Utc::now(),
            started_at: RwLock::new(None),
            last_telemetry_at: RwLock::new(None),
            error_message: RwLock::new(None),
            counters: DeviceCounters::default(),
            last_telemetry: RwLock::new(HashMap::new()),
            custom_state: RwLock::new(HashMap::new()),
            adapter: RwLock::new(None),
            tasks: RwLock::new(Vec::new()),
            cancel: RwLock::new(None),
            metrics,
        }
    }

    pub async fn status(&self) -> DeviceStatus {
        *self.status.read().await
    }

    pub async fn set_custom_state(&self, key: String, value: Value) {
        self.custom_state.write().await.insert(key, value);
    }

    pub async fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
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
            last_telemetry: self.last_telemetry.read().await.clone(),
        }
    }

    fn client_id(&self) -> String {
        let empty = HashMap::new();
        let ctx = TemplateContext {
            device_id: &self.device_id,
            model_id: &self.model_id,
            last_telemetry: &empty,
            custom_state: &empty,
        };
        match &self.connection.client_id_pattern {
            Some(pattern) => template::resolve(pattern, &ctx),
            None => self.device_id.clone(),
        }
    }

    fn build_adapter(&self) -> Result<Arc<dyn ProtocolAdapter>, AdapterError> {
        match self.protocol {
            Protocol::Mqtt => {
                #[cfg(feature = "mqtt")]
                {
                    let adapter = crate::adapters::mqtt::MqttAdapter::new(
                        self.client_id(),
                        &self.connection.broker,
                        self.connection.port,
                        self.connection.keep_alive,
                        self.connection.clean_session,
                    )
                    .with_credentials(self.connection.username.clone(), None);
                    Ok(Arc::new(adapter))
                }
                #[cfg(not(feature = "mqtt"))]
                Err(AdapterError::Configuration("mqtt support not compiled in".into()))
            }
            Protocol::Http => {
                #[cfg(feature = "http")]
                {
                    let scheme = if self.connection.tls { "https" } else { "http" };
                    let base = format!("{scheme}://{}:{}", self.connection.broker, self.connection.port);
                    Ok(Arc::new(crate::adapters::http::HttpAdapter::new(base)))
                }
                #[cfg(not(feature = "http"))]
                Err(AdapterError::Configuration("http support not compiled in".into()))
            }
            Protocol::Coap => {
                #[cfg(feature = "coap")]
                {
                    Ok(Arc::new(crate::adapters::coap::CoapAdapter::new(
                        &self.connection.broker,
                        self.connection.port,
                    )?))
                }
                #[cfg(not(feature = "coap"))]
                Err(AdapterError::Configuration("coap support not compiled in".into()))
            }
        }
    }

    /// `created|stopped|error -> running`. A no-op if already running.
    /// Takes `self: &Arc<Self>` because the spawned telemetry tasks need an
    /// owned handle on the device that outlives this call.
    pub async fn start(self: &Arc<Self>) -> Result<(), AdapterError> {
        if matches!(*self.status.read().await, DeviceStatus::Running) {
            return Ok(());
        }

        *self.status.write().await = DeviceStatus::Starting;
        *self.error_message.write().await = None;

        match self.try_start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.status.write().await = DeviceStatus::Error;
                *self.connection_state.write().await = ConnectionState::Disconnected;
                *self.error_message.write().await = Some(e.to_string());
                self.counters.error_count.fetch_add(1, Ordering::SeqCst);
                self.metrics
                    .write_connection_metric(
                        &self.device_id,
                        &self.model_id,
                        self.group_id.as_deref(),
                        DeviceSource::Simulated,
                        false,
                        None,
                    )
                    .await;
                self.metrics
                    .write_device_event(
                        &self.device_id,
                        &self.model_id,
                        self.group_id.as_deref(),
                        DeviceSource::Simulated,
                        "error",
                    )
                    .await;
                error!(device_id = %self.device_id, error = %e, "device start failed");
                Err(e)
            }
        }
    }

    async fn try_start(self: &Arc<Self>) -> Result<(), AdapterError> {
        let adapter = self.build_adapter()?;

        *self.connection_state.write().await = ConnectionState::Connecting;
        let dial_started = std::time::Instant::now();
        adapter.connect().await?;
        let latency_ms = dial_started.elapsed().as_millis() as u64;

        *self.connection_state.write().await = ConnectionState::Connected;
        *self.adapter.write().await = Some(adapter.clone());

        self.metrics
            .write_connection_metric(
                &self.device_id,
                &self.model_id,
                self.group_id.as_deref(),
                DeviceSource::Simulated,
                true,
                Some(latency_ms),
            )
            .await;

        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.telemetry.len());
        for attribute in self.telemetry.clone() {
            let generator = generators::build(&attribute.generator);
            handles.push(spawn_telemetry_task(
                self.clone(),
                adapter.clone(),
                attribute,
                generator,
                cancel.clone(),
            ));
        }

        *self.cancel.write().await = Some(cancel);
        *self.tasks.write().await = handles;
        *self.status.write().await = DeviceStatus::Running;
        *self.started_at.write().await = Some(Utc::now());

        self.metrics
            .write_device_event(
                &self.device_id,
                &self.model_id,
                self.group_id.as_deref(),
                DeviceSource::Simulated,
                "started",
            )
            .await;
        info!(device_id = %self.device_id, "device started");
        Ok(())
    }

    /// `running -> stopped`. A no-op if already stopped.
    pub async fn stop(self: &Arc<Self>) -> Result<(), AdapterError> {
        if matches!(*self.status.read().await, DeviceStatus::Stopped) {
            return Ok(());
        }

        *self.status.write().await = DeviceStatus::Stopping;
        if let Some(cancel) = self.cancel.write().await.take() {
            cancel.cancel();
        }
        for handle in self.tasks.write().await.drain(..) {
            let _ = handle.await;
        }

        if let Some(adapter) = self.adapter.write().await.take() {
            if let Err(e) = adapter.disconnect().await {
                warn!(device_id = %self.device_id, error = %e, "adapter disconnect failed, continuing stop");
            }
        }

        *self.connection_state.write().await = ConnectionState::Disconnected;
        *self.status.write().await = DeviceStatus::Stopped;

        self.metrics
            .write_connection_metric(
                &self.device_id,
                &self.model_id,
                self.group_id.as_deref(),
                DeviceSource::Simulated,
                false,
                None,
            )
            .await;
        self.metrics
            .write_device_event(
                &self.device_id,
                &self.model_id,
                self.group_id.as_deref(),
                DeviceSource::Simulated,
                "stopped",
            )
            .await;
        info!(device_id = %self.device_id, "device stopped");
        Ok(())
    }
}

fn spawn_telemetry_task(
    device: Arc<VirtualDevice>,
    adapter: Arc<dyn ProtocolAdapter>,
    attribute: TelemetryAttributeConfig,
    mut generator: Box<dyn Generator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let default_topic_pattern = device.connection.topic_pattern.clone();
        let raw_topic = attribute
            .topic
            .clone()
            .or(default_topic_pattern)
            .unwrap_or_else(|| "devices/${deviceId}/telemetry".to_string());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = publish_once(&device, &adapter, &attribute, &raw_topic, generator.as_mut()) => {}
            }
        }
    })
}

/// One publish-and-sleep cycle of a telemetry task. Runs to completion
/// (publish, then the full interval sleep) unless cancelled by the
/// `tokio::select!` in the caller, in which case the in-flight future is
/// simply dropped — no counters are touched after that point.
async fn publish_once(
    device: &Arc<VirtualDevice>,
    adapter: &Arc<dyn ProtocolAdapter>,
    attribute: &TelemetryAttributeConfig,
    raw_topic: &str,
    generator: &mut dyn Generator,
) {
    let value = generator.generate();

    let ctx_snapshot = {
        let lt = device.last_telemetry.read().await.clone();
        let cs = device.custom_state.read().await.clone();
        TemplateContext {
            device_id: &device.device_id,
            model_id: &device.model_id,
            last_telemetry: &lt,
            custom_state: &cs,
        }
    };
    let topic = template::resolve(raw_topic, &ctx_snapshot);

    {
        let mut lt = device.last_telemetry.write().await;
        lt.insert(attribute.name.clone(), value.clone());
    }

    let mut payload_map = serde_json::Map::new();
    payload_map.insert("deviceId".to_string(), Value::String(device.device_id.clone()));
    payload_map.insert("timestamp".to_string(), Value::String(template::iso_now()));
    payload_map.insert(attribute.name.clone(), value);
    if let Some(unit) = &attribute.unit {
        payload_map.insert("unit".to_string(), Value::String(unit.clone()));
    }
    let payload_value = Value::Object(payload_map);

    if adapter.is_connected() {
        let len = Payload::Json(payload_value.clone()).len_bytes() as u64;
        match adapter
            .publish(&topic, Payload::Json(payload_value.clone()), device.connection.qos)
            .await
        {
            Ok(()) => {
                device.counters.messages_sent.fetch_add(1, Ordering::SeqCst);
                device.counters.bytes_sent.fetch_add(len, Ordering::SeqCst);
                *device.last_telemetry_at.write().await = Some(Utc::now());
                let fields = coerce_fields(&payload_value);
                device
                    .metrics
                    .write_telemetry(
                        &device.device_id,
                        &device.model_id,
                        device.group_id.as_deref(),
                        DeviceSource::Simulated,
                        &fields,
                    )
                    .await;
            }
            Err(e) => {
                device.counters.error_count.fetch_add(1, Ordering::SeqCst);
                warn!(device_id = %device.device_id, attribute = %attribute.name, error = %e, "telemetry publish failed");
            }
        }
    }

    tokio::time::sleep(std::time::Duration::from_millis(attribute.interval_ms)).await;
}
