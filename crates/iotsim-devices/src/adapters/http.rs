//! Outbound HTTP adapter: a keep-alive client POSTing telemetry to
//! `baseUrl/topic`. HTTP has no native subscription mechanism, so
//! `subscribe` is a documented no-op that logs a warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::adapter::{AdapterError, MessageCallback, Payload, ProtocolAdapter};

pub struct HttpAdapter {
    base_url: String,
    client: Client,
    connected: AtomicBool,
}

impl HttpAdapter {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        HttpAdapter {
            base_url,
            client,
            connected: AtomicBool::new(false),
        }
    }

    fn url_for(&self, topic: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), topic.trim_start_matches('/'))
    }

    pub async fn get(&self, topic: &str) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .client
            .get(self.url_for(topic))
            .send()
            .await
            .map_err(|e| AdapterError::Communication(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Communication(format!(
                "GET {} returned {}",
                topic,
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| AdapterError::Communication(e.to_string()))
    }

    pub async fn put(&self, topic: &str, payload: Payload) -> Result<(), AdapterError> {
        let response = match &payload {
            Payload::Json(v) => self.client.put(self.url_for(topic)).json(v).send().await,
            Payload::Raw(bytes) => {
                self.client
                    .put(self.url_for(topic))
                    .body(bytes.clone())
                    .send()
                    .await
            }
        }
        .map_err(|e| AdapterError::Communication(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError::Communication(format!(
                "PUT {} returned {}",
                topic,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    async fn connect(&self) -> Result<(), AdapterError> {
        // HTTP is connectionless; "connected" just means ready to send.
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Payload, _qos: u8) -> Result<(), AdapterError> {
        let response = match &payload {
            Payload::Json(v) => self.client.post(self.url_for(topic)).json(v).send().await,
            Payload::Raw(bytes) => {
                self.client
                    .post(self.url_for(topic))
                    .body(bytes.clone())
                    .send()
                    .await
            }
        }
        .map_err(|e| AdapterError::Communication(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError::Communication(format!(
                "POST {} returned {}",
                topic,
                response.status()
            )));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        _qos: u8,
        _callback: MessageCallback,
    ) -> Result<(), AdapterError> {
        warn!("subscribe({topic}) is a no-op on the HTTP adapter: HTTP has no native subscription model");
        Ok(())
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn protocol_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_topic_cleanly() {
        let adapter = HttpAdapter::new("http://broker.local:8080/".to_string());
        assert_eq!(adapter.url_for("/devices/x/telemetry"), "http://broker.local:8080/devices/x/telemetry");
    }
}
