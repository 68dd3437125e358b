//! Inbound proxy adapters.
//!
//! Proxy devices forward telemetry from real external devices into the
//! metrics pipeline. Unlike `ProtocolAdapter`, a `ProxyAdapter` only binds
//! and unbinds an inbound stream — it never publishes outbound telemetry,
//! so it is deliberately a separate, narrower capability set rather than a
//! partial implementation of the outbound trait.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::adapter::AdapterError;
use crate::webhook::WebhookRegistry;

/// Invoked once per successfully decoded inbound telemetry payload.
pub type TelemetryCallback = Arc<dyn Fn(Value) + Send + Sync>;

const PROXY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ProxyAdapter: Send + Sync {
    /// Bind an inbound stream, invoking `on_telemetry` for every decoded
    /// payload. Returns a webhook path when the binding exposes one (HTTP).
    async fn bind(&self, on_telemetry: TelemetryCallback) -> Result<Option<String>, AdapterError>;
    async fn unbind(&self) -> Result<(), AdapterError>;
    fn protocol_name(&self) -> &'static str;
    fn dropped_count(&self) -> u64 {
        0
    }
}

/// Inbound MQTT proxy: connects to the external broker, subscribes to one
/// topic, decodes each payload as JSON and hands it to the callback.
/// Malformed payloads are counted and dropped rather than surfaced.
pub struct MqttProxyAdapter {
    host: String,
    port: u16,
    topic: String,
    qos: u8,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    client: tokio::sync::Mutex<Option<AsyncClient>>,
    dropped: Arc<AtomicU64>,
}

impl MqttProxyAdapter {
    pub fn new(client_id: String, host: String, port: u16, topic: String, qos: u8) -> Self {
        let _ = client_id;
        MqttProxyAdapter {
            host,
            port,
            topic,
            qos,
            task: tokio::sync::Mutex::new(None),
            client: tokio::sync::Mutex::new(None),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn to_qos(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[async_trait]
impl ProxyAdapter for MqttProxyAdapter {
    async fn bind(&self, on_telemetry: TelemetryCallback) -> Result<Option<String>, AdapterError> {
        let mut options = MqttOptions::new(format!("proxy-{}", uuid::Uuid::new_v4()), &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, mut event_loop) = AsyncClient::new(options, 64);

        client
            .subscribe(&self.topic, to_qos(self.qos))
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        let (connect_tx, connect_rx) = tokio::sync::oneshot::channel();
        let mut connect_tx = Some(connect_tx);
        let dropped = self.dropped.clone();
        let topic_pattern = self.topic.clone();

        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        if let Some(tx) = connect_tx.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        if !crate::topic_match::matches(&topic_pattern, &publish.topic) {
                            continue;
                        }
                        match std::str::from_utf8(&publish.payload)
                            .ok()
                            .and_then(|s| serde_json::from_str::<Value>(s).ok())
                        {
                            Some(value) => on_telemetry(value),
                            None => {
                                dropped.fetch_add(1, Ordering::SeqCst);
                                warn!("mqtt proxy: dropped malformed payload on {}", publish.topic);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if let Some(tx) = connect_tx.take() {
                            let _ = tx.send(Err(e.to_string()));
                            return;
                        }
                        warn!("mqtt proxy event loop error: {e}");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        });

        match tokio::time::timeout(PROXY_CONNECT_TIMEOUT, connect_rx).await {
            Ok(Ok(Ok(()))) => {
                *self.task.lock().await = Some(handle);
                *self.client.lock().await = Some(client);
                Ok(None)
            }
            Ok(Ok(Err(e))) => {
                handle.abort();
                Err(AdapterError::Connection(e))
            }
            Ok(Err(_)) => {
                handle.abort();
                Err(AdapterError::Connection("proxy connect channel closed".into()))
            }
            Err(_) => {
                handle.abort();
                Err(AdapterError::Connection("proxy connect timed out after 10s".into()))
            }
        }
    }

    async fn unbind(&self) -> Result<(), AdapterError> {
        if let Some(client) = self.client.lock().await.take() {
            let _ = client.unsubscribe(&self.topic).await;
            let _ = client.disconnect().await;
        }
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    fn protocol_name(&self) -> &'static str {
        "mqtt"
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Inbound HTTP proxy: registers a callback in the process-wide webhook
/// registry keyed by `deviceId` and returns the webhook path the control
/// surface should advertise to callers.
pub struct HttpProxyAdapter {
    device_id: String,
    registry: WebhookRegistry,
    bound: AtomicBool,
}

impl HttpProxyAdapter {
    pub fn new(device_id: String, registry: WebhookRegistry) -> Self {
        HttpProxyAdapter {
            device_id,
            registry,
            bound: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ProxyAdapter for HttpProxyAdapter {
    async fn bind(&self, on_telemetry: TelemetryCallback) -> Result<Option<String>, AdapterError> {
        self.registry.register(&self.device_id, Arc::new(move |payload| on_telemetry(payload)));
        self.bound.store(true, Ordering::SeqCst);
        Ok(Some(format!("/api/v1/webhooks/{}", self.device_id)))
    }

    async fn unbind(&self) -> Result<(), AdapterError> {
        self.registry.unregister(&self.device_id);
        self.bound.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn protocol_name(&self) -> &'static str {
        "http"
    }
}
