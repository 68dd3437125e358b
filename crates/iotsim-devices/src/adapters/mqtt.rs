//! Outbound MQTT 3.1.1 adapter, backed by `rumqttc`.
//!
//! `connect` dials the broker and waits on the client's own connect
//! notification (the first `ConnAck`) with a hard 30-second timeout.
//! Reconnection after an involuntary disconnect is left entirely to
//! `rumqttc`'s event loop — this adapter only observes `is_connected` and
//! does not itself retry (see `DESIGN.md`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::adapter::{AdapterError, InboundMessage, MessageCallback, Payload, ProtocolAdapter};
use crate::topic_match;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

struct Subscription {
    pattern: String,
    callback: MessageCallback,
}

/// Outbound MQTT adapter. One instance per device; `connect`/`disconnect`
/// own the underlying event loop task.
pub struct MqttAdapter {
    options: MqttOptions,
    client: StdMutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

impl MqttAdapter {
    pub fn new(client_id: String, host: &str, port: u16, keep_alive_secs: u64, clean_session: bool) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(keep_alive_secs.max(1)));
        options.set_clean_session(clean_session);
        MqttAdapter {
            options,
            client: StdMutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            poll_task: StdMutex::new(None),
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        if let (Some(u), Some(p)) = (username, password) {
            self.options.set_credentials(u, p);
        }
        self
    }

    fn current_client(&self) -> Result<AsyncClient, AdapterError> {
        self.client
            .lock()
            .expect("mqtt client mutex poisoned")
            .clone()
            .ok_or(AdapterError::Stopped)
    }
}

fn to_qos(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn decode_payload(bytes: &[u8]) -> InboundMessage {
    match std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
    {
        Some(value) => InboundMessage::Json(value),
        None => InboundMessage::Raw(bytes.to_vec()),
    }
}

async fn drive_event_loop(
    mut event_loop: EventLoop,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    connect_tx: oneshot::Sender<Result<(), String>>,
) {
    let mut connect_tx = Some(connect_tx);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                if let Some(tx) = connect_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let topic = publish.topic.clone();
                let message = decode_payload(&publish.payload);
                let subs = subscriptions.read().await;
                for sub in subs.iter() {
                    if topic_match::matches(&sub.pattern, &topic) {
                        (sub.callback)(topic.clone(), message.clone());
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                if let Some(tx) = connect_tx.take() {
                    let _ = tx.send(Err(e.to_string()));
                    return;
                }
                warn!("mqtt event loop error, retrying: {e}");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

#[async_trait]
impl ProtocolAdapter for MqttAdapter {
    async fn connect(&self) -> Result<(), AdapterError> {
        let (client, event_loop) = AsyncClient::new(self.options.clone(), 64);
        let (tx, rx) = oneshot::channel();

        let handle = tokio::spawn(drive_event_loop(
            event_loop,
            self.connected.clone(),
            self.subscriptions.clone(),
            tx,
        ));
        *self.poll_task.lock().expect("poll task mutex poisoned") = Some(handle);
        *self.client.lock().expect("mqtt client mutex poisoned") = Some(client);

        match tokio::time::timeout(CONNECT_TIMEOUT, rx).await {
            Ok(Ok(Ok(()))) => {
                debug!("mqtt adapter connected to {}", self.options.broker_address().0);
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(AdapterError::Connection(e)),
            Ok(Err(_)) => Err(AdapterError::Connection("connect channel closed".into())),
            Err(_) => Err(AdapterError::Connection("connect timed out after 30s".into())),
        }
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        if let Ok(client) = self.current_client() {
            let _ = client.disconnect().await;
        }
        if let Some(handle) = self.poll_task.lock().expect("poll task mutex poisoned").take() {
            handle.abort();
        }
        *self.client.lock().expect("mqtt client mutex poisoned") = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Payload, qos: u8) -> Result<(), AdapterError> {
        let client = self.current_client()?;
        client
            .publish(topic, to_qos(qos), false, payload.into_bytes())
            .await
            .map_err(|e| AdapterError::Communication(e.to_string()))
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: u8,
        callback: MessageCallback,
    ) -> Result<(), AdapterError> {
        let client = self.current_client()?;
        client
            .subscribe(topic, to_qos(qos))
            .await
            .map_err(|e| AdapterError::Communication(e.to_string()))?;
        self.subscriptions.write().await.push(Subscription {
            pattern: topic.to_string(),
            callback,
        });
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), AdapterError> {
        let client = self.current_client()?;
        client
            .unsubscribe(topic)
            .await
            .map_err(|e| AdapterError::Communication(e.to_string()))?;
        self.subscriptions.write().await.retain(|s| s.pattern != topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn protocol_name(&self) -> &'static str {
        "mqtt"
    }
}
