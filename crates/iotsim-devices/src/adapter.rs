//! Protocol adapter capability set.
//!
//! `ProtocolAdapter` is the uniform outbound interface a `VirtualDevice`
//! drives: connect/disconnect/publish/subscribe/unsubscribe plus a liveness
//! check. Concrete adapters (MQTT/HTTP/CoAP) are independent types that
//! compose into the device rather than a class hierarchy — there is no base
//! adapter struct to inherit from.
//!
//! Inbound proxy adapters (`mqtt_proxy`, `http_proxy`) deliberately do not
//! implement this trait: they have a narrower `bind`/`unbind` capability and
//! forcing one interface across both directions would just grow match arms
//! nobody needs.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by adapter operations. Mirrors the shape used across the
/// house's adapter tests: a configuration mistake, a failed connection
/// attempt, a communication error mid-session, use-after-stop, and a catch
/// all for anything else.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter configuration error: {0}")]
    Configuration(String),

    #[error("adapter connection error: {0}")]
    Connection(String),

    #[error("adapter communication error: {0}")]
    Communication(String),

    #[error("adapter is stopped")]
    Stopped,

    #[error("adapter error: {0}")]
    Other(String),
}

/// A telemetry payload as handed to `publish`, accepted either as a
/// structured JSON value (the common case — the device always builds one)
/// or as raw bytes for callers that already have an encoded body.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(Value),
    Raw(Vec<u8>),
}

impl Payload {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Json(v) => serde_json::to_vec(&v).unwrap_or_default(),
            Payload::Raw(bytes) => bytes,
        }
    }

    pub fn len_bytes(&self) -> usize {
        match self {
            Payload::Json(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0),
            Payload::Raw(bytes) => bytes.len(),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Json(v) => write!(f, "{v}"),
            Payload::Raw(bytes) => write!(f, "<{} raw bytes>", bytes.len()),
        }
    }
}

/// Decoded form an inbound message is handed to a subscriber in: JSON when
/// the payload parsed as UTF-8 JSON, raw bytes otherwise.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Json(Value),
    Raw(Vec<u8>),
}

/// Callback invoked for every inbound message on a matching subscription.
pub type MessageCallback = std::sync::Arc<dyn Fn(String, InboundMessage) + Send + Sync>;

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), AdapterError>;
    async fn disconnect(&self) -> Result<(), AdapterError>;
    async fn publish(&self, topic: &str, payload: Payload, qos: u8) -> Result<(), AdapterError>;
    async fn subscribe(
        &self,
        topic: &str,
        qos: u8,
        callback: MessageCallback,
    ) -> Result<(), AdapterError>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), AdapterError>;
    fn is_connected(&self) -> bool;
    fn protocol_name(&self) -> &'static str;
}
