//! Top-level orchestrator: owns the model registry, device catalogue, group
//! index, and the periodic stats task. Writers (create/start/stop/delete)
//! serialise catalogue and group-index mutations behind one lock; readers
//! take a cloned snapshot of the maps and iterate outside the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use iotsim_core::error::{EngineError, EngineResult};
use iotsim_core::types::{DeviceSource, DeviceStatus, DeviceType, Protocol};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::device::VirtualDevice;
use crate::metrics::{EngineStats, MetricsWriter};
use crate::model::ConnectionConfig;
use crate::proxy_device::{BindingConfig, ProxyDevice};
use crate::registry::ModelRegistry;
use crate::webhook::WebhookRegistry;

/// Either device kind, addressed uniformly by the manager and the control
/// surface; proxy-only operations (`bind`/`unbind`) are reached by matching
/// on this variant at the API boundary, per the polymorphism design note.
#[derive(Clone)]
pub enum DeviceEntry {
    Virtual(Arc<VirtualDevice>),
    Proxy(Arc<ProxyDevice>),
}

impl DeviceEntry {
    pub fn device_id(&self) -> &str {
        match self {
            DeviceEntry::Virtual(d) => &d.device_id,
            DeviceEntry::Proxy(d) => &d.device_id,
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            DeviceEntry::Virtual(d) => &d.model_id,
            DeviceEntry::Proxy(d) => &d.model_id,
        }
    }

    pub fn group_id(&self) -> Option<String> {
        match self {
            DeviceEntry::Virtual(d) => d.group_id.clone(),
            DeviceEntry::Proxy(d) => d.group_id.clone(),
        }
    }

    pub async fn status(&self) -> DeviceStatus {
        match self {
            DeviceEntry::Virtual(d) => d.status().await,
            DeviceEntry::Proxy(d) => d.status().await,
        }
    }

    pub fn source(&self) -> DeviceSource {
        match self {
            DeviceEntry::Virtual(_) => DeviceSource::Simulated,
            DeviceEntry::Proxy(_) => DeviceSource::Physical,
        }
    }

    /// Start a virtual device, or reject for proxies — proxies come up
    /// through `bind`, which needs a `BindingConfig` this call site does not
    /// have.
    pub async fn start(&self) -> EngineResult<()> {
        match self {
            DeviceEntry::Virtual(d) => d
                .start()
                .await
                .map_err(|e| EngineError::ConnectionFailed(e.to_string())),
            DeviceEntry::Proxy(_) => Err(EngineError::InvalidArgument(
                "proxy devices are started via bind, not start".into(),
            )),
        }
    }

    pub async fn stop(&self) -> EngineResult<()> {
        match self {
            DeviceEntry::Virtual(d) => d
                .stop()
                .await
                .map_err(|e| EngineError::Internal(anyhow::anyhow!(e.to_string()))),
            DeviceEntry::Proxy(d) => d
                .unbind()
                .await
                .map_err(|e| EngineError::Internal(anyhow::anyhow!(e.to_string()))),
        }
    }

    pub async fn snapshot_json(&self) -> Value {
        match self {
            DeviceEntry::Virtual(d) => {
                let mut value = serde_json::to_value(d.snapshot().await).unwrap_or(Value::Null);
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("kind".to_string(), Value::String("virtual".to_string()));
                }
                value
            }
            DeviceEntry::Proxy(d) => {
                let mut value = serde_json::to_value(d.snapshot().await).unwrap_or(Value::Null);
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("kind".to_string(), Value::String("proxy".to_string()));
                }
                value
            }
        }
    }

    pub async fn counters_totals(&self) -> (u64, u64) {
        match self {
            DeviceEntry::Virtual(d) => {
                let s = d.snapshot().await;
                (
                    s.counters.messages_sent + s.counters.messages_received,
                    s.counters.bytes_sent + s.counters.bytes_received,
                )
            }
            DeviceEntry::Proxy(d) => {
                let s = d.snapshot().await;
                (s.counters.messages_received, s.counters.bytes_received)
            }
        }
    }
}

fn default_base() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum LaunchConfig {
    Immediate,
    Linear {
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
    Batch {
        #[serde(rename = "batchSize")]
        batch_size: usize,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
    Exponential {
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        #[serde(default = "default_base")]
        base: f64,
        #[serde(rename = "maxDelayMs")]
        max_delay_ms: u64,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropoutStrategyConfig {
    Immediate,
    Linear,
    Exponential,
    Random,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DropoutConfig {
    pub strategy: DropoutStrategyConfig,
    pub count: Option<usize>,
    pub percentage: Option<f64>,
    #[serde(rename = "delayMs", default)]
    pub delay_ms: u64,
    #[serde(default = "default_base")]
    pub base: f64,
    #[serde(rename = "durationMs", default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub reconnect: bool,
    #[serde(rename = "reconnectDelayMs", default)]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOpSummary {
    pub group_id: String,
    pub devices_affected: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropoutSummary {
    pub group_id: String,
    pub devices_affected: usize,
    pub dropout_strategy: String,
    pub status: String,
    pub estimated_duration_ms: u64,
}

/// Parameters for `create_device_group`.
pub struct GroupSpec {
    pub model_id: String,
    pub count: usize,
    pub group_id: Option<String>,
    pub id_pattern: Option<String>,
    pub stagger_ms: u64,
}

pub struct DeviceManager {
    registry: ModelRegistry,
    devices: RwLock<HashMap<String, DeviceEntry>>,
    groups: RwLock<HashMap<String, HashSet<String>>>,
    max_devices: usize,
    metrics: Arc<dyn MetricsWriter>,
    webhook_registry: WebhookRegistry,
    stats_cancel: RwLock<Option<CancellationToken>>,
    stats_task: RwLock<Option<JoinHandle<()>>>,
}

impl DeviceManager {
    pub fn new(
        registry: ModelRegistry,
        max_devices: usize,
        metrics: Arc<dyn MetricsWriter>,
        webhook_registry: WebhookRegistry,
    ) -> Arc<Self> {
        Arc::new(DeviceManager {
            registry,
            devices: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            max_devices,
            metrics,
            webhook_registry,
            stats_cancel: RwLock::new(None),
            stats_task: RwLock::new(None),
        })
    }

    pub fn webhook_registry(&self) -> &WebhookRegistry {
        &self.webhook_registry
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn get_device(&self, device_id: &str) -> Option<DeviceEntry> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn list_devices(&self) -> Vec<DeviceEntry> {
        self.devices.read().await.values().cloned().collect()
    }

    pub async fn create_device(
        &self,
        model_id: &str,
        device_id: Option<String>,
        group_id: Option<String>,
        override_connection: Option<ConnectionConfig>,
    ) -> EngineResult<DeviceEntry> {
        let model = self
            .registry
            .get(model_id)
            .await
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown model {model_id}")))?;

        if self.devices.read().await.len() >= self.max_devices {
            return Err(EngineError::ResourceExhausted(format!(
                "max_devices_per_instance ({}) reached",
                self.max_devices
            )));
        }

        let device_id = device_id.unwrap_or_else(|| format!("{model_id}-{}", rand_hex8()));

        let mut devices = self.devices.write().await;
        if devices.contains_key(&device_id) {
            return Err(EngineError::AlreadyExists(format!("device {device_id} already exists")));
        }

        let entry = if model.device_type == DeviceType::Proxy {
            DeviceEntry::Proxy(Arc::new(ProxyDevice::new(
                device_id.clone(),
                model.id.clone(),
                group_id.clone(),
                self.webhook_registry.clone(),
                self.metrics.clone(),
            )))
        } else {
            let base = model.connection.clone().unwrap_or_default();
            let merged = override_connection
                .map(|o| o.merge_over(&base))
                .unwrap_or(base);
            let resolved = merged.with_defaults(model.protocol);
            DeviceEntry::Virtual(Arc::new(VirtualDevice::new(
                device_id.clone(),
                &model,
                group_id.clone(),
                resolved,
                self.metrics.clone(),
            )))
        };

        devices.insert(device_id.clone(), entry.clone());
        drop(devices);

        if let Some(group_id) = &group_id {
            self.groups
                .write()
                .await
                .entry(group_id.clone())
                .or_default()
                .insert(device_id.clone());
        }

        self.metrics
            .write_device_event(&device_id, &model.id, group_id.as_deref(), entry.source(), "created")
            .await;
        info!(device_id = %device_id, model_id = %model.id, "device created");
        Ok(entry)
    }

    pub async fn create_device_group(&self, spec: GroupSpec) -> EngineResult<(String, Vec<String>)> {
        if self.registry.get(&spec.model_id).await.is_none() {
            return Err(EngineError::InvalidArgument(format!("unknown model {}", spec.model_id)));
        }

        let group_id = spec.group_id.unwrap_or_else(|| format!("group-{}", rand_hex8()));
        let pattern = spec.id_pattern.unwrap_or_else(|| "{groupId}-{index}".to_string());

        let mut created = Vec::with_capacity(spec.count);
        for i in 0..spec.count {
            let device_id = pattern.replace("{index}", &i.to_string()).replace("{groupId}", &group_id);
            match self
                .create_device(&spec.model_id, Some(device_id.clone()), Some(group_id.clone()), None)
                .await
            {
                Ok(entry) => created.push(entry.device_id().to_string()),
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "failed to create device in group");
                    if matches!(e, EngineError::ResourceExhausted(_)) {
                        break;
                    }
                }
            }
            if spec.stagger_ms > 0 && i + 1 < spec.count {
                tokio::time::sleep(Duration::from_millis(spec.stagger_ms)).await;
            }
        }
        Ok((group_id, created))
    }

    async fn group_members(&self, group_id: &str) -> EngineResult<Vec<DeviceEntry>> {
        let ids = self
            .groups
            .read()
            .await
            .get(group_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("group {group_id} not found")))?;
        let devices = self.devices.read().await;
        Ok(ids.iter().filter_map(|id| devices.get(id).cloned()).collect())
    }

    pub async fn start_group(&self, group_id: &str, launch: LaunchConfig) -> EngineResult<GroupOpSummary> {
        let members = self.group_members(group_id).await?;
        let mut pending = Vec::new();
        for entry in members {
            if !matches!(entry.status().await, DeviceStatus::Running) {
                pending.push(entry);
            }
        }
        let total = pending.len();
        let mut started = 0;

        match launch {
            LaunchConfig::Immediate => {
                let results = futures::future::join_all(pending.iter().map(|e| e.start())).await;
                started = results.into_iter().filter(|r| r.is_ok()).count();
            }
            LaunchConfig::Linear { delay_ms } => {
                for (i, entry) in pending.iter().enumerate() {
                    if entry.start().await.is_ok() {
                        started += 1;
                    }
                    if i + 1 < total {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
            LaunchConfig::Batch { batch_size, delay_ms } => {
                let batch_size = batch_size.max(1);
                for (batch_index, chunk) in pending.chunks(batch_size).enumerate() {
                    let results = futures::future::join_all(chunk.iter().map(|e| e.start())).await;
                    started += results.into_iter().filter(|r| r.is_ok()).count();
                    let is_last_batch = (batch_index + 1) * batch_size >= total;
                    if !is_last_batch {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
            LaunchConfig::Exponential { delay_ms, base, max_delay_ms } => {
                for (i, entry) in pending.iter().enumerate() {
                    if entry.start().await.is_ok() {
                        started += 1;
                    }
                    if i + 1 < total {
                        let delay = ((delay_ms as f64) * base.powi(i as i32)).min(max_delay_ms as f64);
                        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                    }
                }
            }
        }

        Ok(GroupOpSummary {
            group_id: group_id.to_string(),
            devices_affected: started,
            total,
        })
    }

    pub async fn stop_group(&self, group_id: &str) -> EngineResult<GroupOpSummary> {
        let members = self.group_members(group_id).await?;
        let mut running = Vec::new();
        for entry in members {
            if matches!(entry.status().await, DeviceStatus::Running) {
                running.push(entry);
            }
        }
        let total = running.len();
        let mut stopped = 0;
        for entry in &running {
            if entry.stop().await.is_ok() {
                stopped += 1;
            }
        }
        Ok(GroupOpSummary {
            group_id: group_id.to_string(),
            devices_affected: stopped,
            total,
        })
    }

    pub async fn delete_group(&self, group_id: &str) -> EngineResult<usize> {
        let ids = self
            .groups
            .write()
            .await
            .remove(group_id)
            .ok_or_else(|| EngineError::NotFound(format!("group {group_id} not found")))?;

        let mut deleted = 0;
        for id in ids {
            if let Some(entry) = self.devices.write().await.remove(&id) {
                if matches!(entry.status().await, DeviceStatus::Running) {
                    let _ = entry.stop().await;
                }
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub async fn simulate_dropouts(self: &Arc<Self>, group_id: &str, config: DropoutConfig) -> EngineResult<DropoutSummary> {
        let members = self.group_members(group_id).await?;
        let mut running_simulated = Vec::new();
        for entry in members {
            if matches!(entry, DeviceEntry::Virtual(_)) && matches!(entry.status().await, DeviceStatus::Running) {
                running_simulated.push(entry);
            }
        }

        let available = running_simulated.len();
        let target_count = if let Some(count) = config.count {
            count.min(available)
        } else if let Some(pct) = config.percentage {
            ((available as f64) * pct / 100.0).floor() as usize
        } else {
            available
        };

        let mut rng = rand::thread_rng();
        running_simulated.shuffle(&mut rng);
        let targets: Vec<DeviceEntry> = running_simulated.into_iter().take(target_count).collect();
        let n = targets.len();

        let (status, estimated_duration_ms) = match config.strategy {
            DropoutStrategyConfig::Immediate => {
                futures::future::join_all(targets.iter().map(|e| e.stop())).await;
                ("completed".to_string(), 0)
            }
            DropoutStrategyConfig::Linear => {
                for (i, entry) in targets.iter().enumerate() {
                    let _ = entry.stop().await;
                    if i + 1 < n {
                        tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
                    }
                }
                ("completed".to_string(), config.delay_ms.saturating_mul(n.saturating_sub(1) as u64))
            }
            DropoutStrategyConfig::Exponential => {
                let mut total_delay = 0u64;
                for (i, entry) in targets.iter().enumerate() {
                    let _ = entry.stop().await;
                    let delay = ((config.delay_ms as f64) / config.base.powi(i as i32)).max(1.0) as u64;
                    total_delay += delay;
                    if i + 1 < n {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                ("completed".to_string(), total_delay)
            }
            DropoutStrategyConfig::Random => {
                if config.duration_ms > 0 {
                    let mut offsets: Vec<u64> = (0..n)
                        .map(|_| rand::thread_rng().gen_range(0..=config.duration_ms))
                        .collect();
                    offsets.sort_unstable();
                    let metrics = self.metrics.clone();
                    let group_id_owned = group_id.to_string();
                    tokio::spawn(async move {
                        let mut elapsed = 0u64;
                        for (entry, offset) in targets.into_iter().zip(offsets) {
                            if offset > elapsed {
                                tokio::time::sleep(Duration::from_millis(offset - elapsed)).await;
                                elapsed = offset;
                            }
                            let _ = entry.stop().await;
                        }
                        metrics
                            .write_device_event("*", "*", Some(&group_id_owned), DeviceSource::Simulated, "dropout_window_complete")
                            .await;
                    });
                    ("scheduled".to_string(), config.duration_ms)
                } else {
                    for entry in &targets {
                        let jitter = rand::thread_rng().gen_range(0..=100);
                        tokio::time::sleep(Duration::from_millis(jitter)).await;
                        let _ = entry.stop().await;
                    }
                    ("completed".to_string(), 100)
                }
            }
        };

        if config.reconnect && status == "completed" {
            let device_ids: Vec<String> = targets.iter().map(|e| e.device_id().to_string()).collect();
            let manager = self.clone();
            let reconnect_delay_ms = config.reconnect_delay_ms;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(reconnect_delay_ms)).await;
                for id in device_ids {
                    if let Some(entry) = manager.get_device(&id).await {
                        if let Err(e) = entry.start().await {
                            warn!(device_id = %id, error = %e, "reconnect after dropout failed");
                        }
                    }
                }
            });
        }

        Ok(DropoutSummary {
            group_id: group_id.to_string(),
            devices_affected: n,
            dropout_strategy: format!("{:?}", config.strategy).to_lowercase(),
            status,
            estimated_duration_ms,
        })
    }

    pub async fn bind_proxy(&self, device_id: &str, config: BindingConfig) -> EngineResult<Option<String>> {
        match self.get_device(device_id).await {
            Some(DeviceEntry::Proxy(device)) => device
                .bind(config)
                .await
                .map_err(|e| EngineError::ConnectionFailed(e.to_string())),
            Some(DeviceEntry::Virtual(_)) => Err(EngineError::InvalidArgument(format!(
                "device {device_id} is not a proxy device"
            ))),
            None => Err(EngineError::NotFound(format!("device {device_id} not found"))),
        }
    }

    pub async fn unbind_proxy(&self, device_id: &str) -> EngineResult<()> {
        match self.get_device(device_id).await {
            Some(DeviceEntry::Proxy(device)) => device
                .unbind()
                .await
                .map_err(|e| EngineError::Internal(anyhow::anyhow!(e.to_string()))),
            Some(DeviceEntry::Virtual(_)) => Err(EngineError::InvalidArgument(format!(
                "device {device_id} is not a proxy device"
            ))),
            None => Err(EngineError::NotFound(format!("device {device_id} not found"))),
        }
    }

    pub async fn delete_device(&self, device_id: &str) -> EngineResult<()> {
        let entry = self
            .devices
            .write()
            .await
            .remove(device_id)
            .ok_or_else(|| EngineError::NotFound(format!("device {device_id} not found")))?;

        if matches!(entry.status().await, DeviceStatus::Running) {
            let _ = entry.stop().await;
        }
        if let Some(group_id) = entry.group_id() {
            let mut groups = self.groups.write().await;
            if let Some(members) = groups.get_mut(&group_id) {
                members.remove(device_id);
                if members.is_empty() {
                    groups.remove(&group_id);
                }
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> EngineStats {
        let devices = self.devices.read().await;
        let groups = self.groups.read().await;

        let mut running_devices = 0;
        let mut running_simulated = 0;
        let mut running_physical = 0;
        let mut total_messages = 0u64;
        let mut total_bytes = 0u64;

        for entry in devices.values() {
            if matches!(entry.status().await, DeviceStatus::Running) {
                running_devices += 1;
                match entry.source() {
                    DeviceSource::Simulated => running_simulated += 1,
                    DeviceSource::Physical => running_physical += 1,
                }
            }
            let (messages, bytes) = entry.counters_totals().await;
            total_messages += messages;
            total_bytes += bytes;
        }

        EngineStats {
            running_devices,
            running_simulated,
            running_physical,
            total_messages,
            total_bytes,
            active_groups: groups.values().filter(|members| !members.is_empty()).count(),
        }
    }

    /// Spawn the periodic stats task. Idempotent: a second call cancels the
    /// previous task before replacing it.
    pub async fn start_stats_task(self: &Arc<Self>) {
        let manager = self.clone();
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => break,
                    _ = interval.tick() => {
                        let stats = manager.stats().await;
                        manager.metrics.write_engine_stats(&stats).await;
                    }
                }
            }
        });

        if let Some(old) = self.stats_cancel.write().await.replace(cancel) {
            old.cancel();
        }
        *self.stats_task.write().await = Some(handle);
    }

    /// Cancel the stats task and stop every running device. Errors are
    /// logged, not raised — shutdown always completes.
    pub async fn shutdown(&self) {
        if let Some(cancel) = self.stats_cancel.write().await.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.stats_task.write().await.take() {
            let _ = handle.await;
        }

        let devices: Vec<DeviceEntry> = self.devices.read().await.values().cloned().collect();
        for entry in devices {
            if matches!(entry.status().await, DeviceStatus::Running) {
                if let Err(e) = entry.stop().await {
                    warn!(device_id = entry.device_id(), error = %e, "error stopping device during shutdown");
                }
            }
        }
        self.devices.write().await.clear();
        self.groups.write().await.clear();
        info!("device manager shut down");
    }
}

fn rand_hex8() -> String {
    let n: u32 = rand::thread_rng().gen();
    format!("{n:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetricsWriter;
    use crate::model::{DeviceModelConfig, TelemetryAttributeConfig};
    use iotsim_core::types::DeviceType;
    use std::collections::HashMap as Map;

    fn sensor_model(id: &str) -> DeviceModelConfig {
        DeviceModelConfig {
            id: id.to_string(),
            name: "sensor".to_string(),
            version: "1.0.0".to_string(),
            device_type: DeviceType::Sensor,
            protocol: Protocol::Http,
            connection: None,
            telemetry: vec![TelemetryAttributeConfig {
                name: "t".to_string(),
                value_type: None,
                unit: None,
                generator: crate::model::GeneratorConfig::Constant {
                    value: serde_json::json!(42),
                },
                interval_ms: 50,
                topic: None,
            }],
            metadata: Map::new(),
        }
    }

    async fn manager_with_model(model_id: &str, max_devices: usize) -> Arc<DeviceManager> {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ModelRegistry::new(dir.path());
        registry.register(sensor_model(model_id)).await.expect("register model");
        DeviceManager::new(registry, max_devices, Arc::new(NoopMetricsWriter), WebhookRegistry::new())
    }

    #[tokio::test]
    async fn create_device_rejects_unknown_model() {
        let manager = manager_with_model("s1", 10).await;
        let result = manager.create_device("unknown", None, None, None).await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn create_device_enforces_capacity() {
        let manager = manager_with_model("s1", 1).await;
        manager.create_device("s1", None, None, None).await.expect("first device ok");
        let result = manager.create_device("s1", None, None, None).await;
        assert!(matches!(result, Err(EngineError::ResourceExhausted(_))));
    }

    #[tokio::test]
    async fn create_device_rejects_duplicate_id() {
        let manager = manager_with_model("s1", 10).await;
        manager
            .create_device("s1", Some("dev-1".to_string()), None, None)
            .await
            .expect("first create ok");
        let result = manager.create_device("s1", Some("dev-1".to_string()), None, None).await;
        assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn create_device_group_creates_count_devices_with_group_index() {
        let manager = manager_with_model("s1", 10).await;
        let (group_id, ids) = manager
            .create_device_group(GroupSpec {
                model_id: "s1".to_string(),
                count: 3,
                group_id: None,
                id_pattern: None,
                stagger_ms: 0,
            })
            .await
            .expect("group creation succeeds");
        assert_eq!(ids.len(), 3);
        let summary = manager.stop_group(&group_id).await.expect("stop group ok");
        assert_eq!(summary.total, 0);
    }

    #[tokio::test]
    async fn start_and_stop_group_immediate() {
        let manager = manager_with_model("s1", 10).await;
        let (group_id, ids) = manager
            .create_device_group(GroupSpec {
                model_id: "s1".to_string(),
                count: 4,
                group_id: None,
                id_pattern: None,
                stagger_ms: 0,
            })
            .await
            .expect("group creation succeeds");
        assert_eq!(ids.len(), 4);

        let started = manager
            .start_group(&group_id, LaunchConfig::Immediate)
            .await
            .expect("start group succeeds");
        assert_eq!(started.devices_affected, 4);

        let stopped = manager.stop_group(&group_id).await.expect("stop group succeeds");
        assert_eq!(stopped.devices_affected, 4);
    }

    #[tokio::test]
    async fn delete_device_removes_from_group_index() {
        let manager = manager_with_model("s1", 10).await;
        let (group_id, ids) = manager
            .create_device_group(GroupSpec {
                model_id: "s1".to_string(),
                count: 2,
                group_id: None,
                id_pattern: None,
                stagger_ms: 0,
            })
            .await
            .expect("group creation succeeds");
        manager.delete_device(&ids[0]).await.expect("delete succeeds");
        assert!(manager.get_device(&ids[0]).await.is_none());
        let deleted = manager.delete_group(&group_id).await.expect("delete group succeeds");
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn simulate_dropouts_immediate_stops_selected_count() {
        let manager = manager_with_model("s1", 10).await;
        let (group_id, _) = manager
            .create_device_group(GroupSpec {
                model_id: "s1".to_string(),
                count: 5,
                group_id: None,
                id_pattern: None,
                stagger_ms: 0,
            })
            .await
            .expect("group creation succeeds");
        manager
            .start_group(&group_id, LaunchConfig::Immediate)
            .await
            .expect("start succeeds");

        let summary = manager
            .simulate_dropouts(
                &group_id,
                DropoutConfig {
                    strategy: DropoutStrategyConfig::Immediate,
                    count: Some(3),
                    percentage: None,
                    delay_ms: 0,
                    base: 2.0,
                    duration_ms: 0,
                    reconnect: false,
                    reconnect_delay_ms: 0,
                },
            )
            .await
            .expect("dropout succeeds");
        assert_eq!(summary.devices_affected, 3);
        assert_eq!(summary.status, "completed");
    }
}
