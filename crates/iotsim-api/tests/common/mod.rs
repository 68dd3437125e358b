//! Common test utilities for API handler tests.

use std::collections::HashMap;

use iotsim_api::ServerState;
use iotsim_core::types::{DeviceType, Protocol};
use iotsim_devices::model::{ConnectionConfig, DeviceModelConfig, GeneratorConfig, TelemetryAttributeConfig};
use iotsim_devices::{DeviceManager, ModelRegistry, NoopMetricsWriter, WebhookRegistry};

/// Build a `ServerState` backed by a fresh temp-dir model registry, a
/// no-op metrics sink, and a capacity large enough that tests don't trip
/// the resource-exhausted path unless they mean to.
pub async fn test_server_state(max_devices: usize) -> (ServerState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = ModelRegistry::new(dir.path());
    let manager = DeviceManager::new(
        registry.clone(),
        max_devices,
        std::sync::Arc::new(NoopMetricsWriter),
        WebhookRegistry::new(),
    );
    (ServerState::new(manager, registry), dir)
}

/// An HTTP-protocol sensor model with one fast constant-valued attribute —
/// HTTP so tests never attempt a real network dial.
pub fn constant_sensor_model(id: &str, interval_ms: u64) -> DeviceModelConfig {
    DeviceModelConfig {
        id: id.to_string(),
        name: "test sensor".to_string(),
        version: "1.0.0".to_string(),
        device_type: DeviceType::Sensor,
        protocol: Protocol::Http,
        connection: Some(ConnectionConfig::default()),
        telemetry: vec![TelemetryAttributeConfig {
            name: "t".to_string(),
            value_type: Some("number".to_string()),
            unit: None,
            generator: GeneratorConfig::Constant {
                value: serde_json::json!(42),
            },
            interval_ms,
            topic: None,
        }],
        metadata: HashMap::new(),
    }
}

/// Bind an ephemeral local port and answer every request with a bare
/// `200 OK`, closing the connection afterwards. Lets HTTP-protocol device
/// tests exercise a real publish round trip without reaching outside the
/// test process.
pub async fn spawn_http_200_sink() -> std::net::SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind sink");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) => return,
                        Ok(n) => {
                            received.extend_from_slice(&buf[..n]);
                            if received.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            });
        }
    });

    addr
}

pub fn proxy_model(id: &str) -> DeviceModelConfig {
    DeviceModelConfig {
        id: id.to_string(),
        name: "test proxy".to_string(),
        version: "1.0.0".to_string(),
        device_type: DeviceType::Proxy,
        protocol: Protocol::Http,
        connection: None,
        telemetry: Vec::new(),
        metadata: HashMap::new(),
    }
}
