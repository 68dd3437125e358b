//! Outbound CoAP adapter (RFC 7252), backed by `coap-lite` for packet
//! encoding and a plain `tokio::net::UdpSocket` for transport — `coap-lite`
//! is a wire-format crate, not a client, so the adapter owns the socket
//! itself.
//!
//! `publish` issues a PUT, confirmable iff `qos >= 1`. `subscribe` registers
//! a CoAP Observe (RFC 7641): a GET with the Observe option set to `0`,
//! followed by a background task that reads every subsequent notification
//! off the socket and dispatches it to the callback. `unsubscribe` cancels
//! the observation (Observe option `1`) and stops the receiver task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use coap_lite::{CoapOption, CoapRequest, MessageType, Packet, RequestType};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::adapter::{AdapterError, InboundMessage, MessageCallback, Payload, ProtocolAdapter};

struct Observation {
    task: JoinHandle<()>,
}

pub struct CoapAdapter {
    addr: SocketAddr,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    message_id: AtomicU16,
    connected: AtomicBool,
    observations: Mutex<HashMap<String, Observation>>,
}

impl CoapAdapter {
    pub fn new(host: &str, port: u16) -> Result<Self, AdapterError> {
        let addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .map_err(|e| AdapterError::Configuration(format!("invalid coap address: {e}")))?;
        Ok(CoapAdapter {
            addr,
            socket: Mutex::new(None),
            message_id: AtomicU16::new(1),
            connected: AtomicBool::new(false),
            observations: Mutex::new(HashMap::new()),
        })
    }

    fn next_message_id(&self) -> u16 {
        self.message_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn current_socket(&self) -> Result<Arc<UdpSocket>, AdapterError> {
        self.socket
            .lock()
            .await
            .clone()
            .ok_or(AdapterError::Stopped)
    }

    fn build_request(&self, method: RequestType, topic: &str, confirmable: bool) -> CoapRequest<SocketAddr> {
        let mut request: CoapRequest<SocketAddr> = CoapRequest::new();
        request.set_method(method);
        request.set_path(topic.trim_start_matches('/'));
        request.message.header.set_message_id(self.next_message_id());
        request.message.header.set_type(if confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        });
        request
    }
}

#[async_trait]
impl ProtocolAdapter for CoapAdapter {
    async fn connect(&self) -> Result<(), AdapterError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        socket
            .connect(self.addr)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        *self.socket.lock().await = Some(Arc::new(socket));
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        let mut observations = self.observations.lock().await;
        for (_, obs) in observations.drain() {
            obs.task.abort();
        }
        *self.socket.lock().await = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Payload, qos: u8) -> Result<(), AdapterError> {
        let socket = self.current_socket().await?;
        let mut request = self.build_request(RequestType::Put, topic, qos >= 1);
        request.message.payload = payload.into_bytes();
        let bytes = request
            .message
            .to_bytes()
            .map_err(|e| AdapterError::Communication(format!("coap encode error: {e:?}")))?;
        socket
            .send(&bytes)
            .await
            .map_err(|e| AdapterError::Communication(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        _qos: u8,
        callback: MessageCallback,
    ) -> Result<(), AdapterError> {
        let socket = self.current_socket().await?;
        let mut request = self.build_request(RequestType::Get, topic, true);
        request.message.add_option(CoapOption::Observe, vec![0]);
        let bytes = request
            .message
            .to_bytes()
            .map_err(|e| AdapterError::Communication(format!("coap encode error: {e:?}")))?;
        socket
            .send(&bytes)
            .await
            .map_err(|e| AdapterError::Communication(e.to_string()))?;

        let recv_socket = socket.clone();
        let topic_owned = topic.to_string();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                match recv_socket.recv(&mut buf).await {
                    Ok(n) => match Packet::from_bytes(&buf[..n]) {
                        Ok(packet) => {
                            let message = match std::str::from_utf8(&packet.payload)
                                .ok()
                                .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
                            {
                                Some(v) => InboundMessage::Json(v),
                                None => InboundMessage::Raw(packet.payload.clone()),
                            };
                            callback(topic_owned.clone(), message);
                        }
                        Err(e) => warn!("coap: malformed observe notification on {topic_owned}: {e:?}"),
                    },
                    Err(e) => {
                        warn!("coap: observe socket read error on {topic_owned}: {e}");
                        break;
                    }
                }
            }
        });

        self.observations
            .lock()
            .await
            .insert(topic.to_string(), Observation { task });
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), AdapterError> {
        if let Some(obs) = self.observations.lock().await.remove(topic) {
            obs.task.abort();
        }
        if let Ok(socket) = self.current_socket().await {
            let mut request = self.build_request(RequestType::Get, topic, true);
            request.message.add_option(CoapOption::Observe, vec![1]);
            if let Ok(bytes) = request.message.to_bytes() {
                let _ = socket.send(&bytes).await;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn protocol_name(&self) -> &'static str {
        "coap"
    }
}
