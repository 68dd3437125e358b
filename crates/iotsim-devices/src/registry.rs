//! In-memory + on-disk catalogue of device models.
//!
//! Models are loaded once at startup from a glob over the configured
//! directory and afterwards only mutated through `register`, which both
//! updates the in-memory map and persists the model back to disk as
//! `{id}.json` — re-registration replaces, it never mutates a model in
//! place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use iotsim_core::error::{EngineError, EngineResult};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::model::DeviceModelConfig;

#[derive(Clone)]
pub struct ModelRegistry {
    models: Arc<RwLock<HashMap<String, DeviceModelConfig>>>,
    model_dir: PathBuf,
}

impl ModelRegistry {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        ModelRegistry {
            models: Arc::new(RwLock::new(HashMap::new())),
            model_dir: model_dir.into(),
        }
    }

    /// Recursively glob `model_dir` for `*.json` files and load each as a
    /// `DeviceModelConfig`. The file's base name is informational — `id`
    /// inside the JSON is authoritative and may collide across files, in
    /// which case the later glob match wins. Unreadable or malformed files
    /// are logged and skipped; they do not abort startup.
    pub async fn load_from_disk(&self) -> EngineResult<usize> {
        let pattern = format!("{}/**/*.json", self.model_dir.display());
        let paths: Vec<PathBuf> = match glob::glob(&pattern) {
            Ok(entries) => entries.filter_map(Result::ok).collect(),
            Err(e) => {
                return Err(EngineError::Internal(anyhow::anyhow!(
                    "invalid model glob pattern {pattern}: {e}"
                )))
            }
        };

        let mut loaded = 0;
        let mut models = self.models.write().await;
        for path in paths {
            match load_model_file(&path) {
                Ok(model) => {
                    info!(model_id = %model.id, path = %path.display(), "loaded device model");
                    models.insert(model.id.clone(), model);
                    loaded += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable device model file"),
            }
        }
        Ok(loaded)
    }

    pub async fn get(&self, id: &str) -> Option<DeviceModelConfig> {
        self.models.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<DeviceModelConfig> {
        self.models.read().await.values().cloned().collect()
    }

    /// Insert or replace a model and persist it to `{id}.json` under the
    /// configured directory. Persistence failures are logged but do not
    /// fail the registration — the in-memory registry is the source of
    /// truth for the life of the process.
    pub async fn register(&self, model: DeviceModelConfig) -> EngineResult<DeviceModelConfig> {
        let path = self.model_dir.join(format!("{}.json", model.id));
        if let Err(e) = persist_model_file(&path, &model) {
            warn!(model_id = %model.id, error = %e, "failed to persist device model to disk");
        }
        self.models.write().await.insert(model.id.clone(), model.clone());
        Ok(model)
    }
}

fn load_model_file(path: &Path) -> anyhow::Result<DeviceModelConfig> {
    let contents = std::fs::read_to_string(path)?;
    let model = serde_json::from_str(&contents)?;
    Ok(model)
}

fn persist_model_file(path: &Path, model: &DeviceModelConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(model)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotsim_core::types::{DeviceType, Protocol};

    fn sample_model(id: &str) -> DeviceModelConfig {
        DeviceModelConfig {
            id: id.to_string(),
            name: "sensor".to_string(),
            version: "1.0.0".to_string(),
            device_type: DeviceType::Sensor,
            protocol: Protocol::Mqtt,
            connection: None,
            telemetry: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ModelRegistry::new(dir.path());
        registry.register(sample_model("s1")).await.expect("register succeeds");

        let fetched = registry.get("s1").await.expect("model present");
        assert_eq!(fetched.id, "s1");
        assert!(dir.path().join("s1.json").exists());
    }

    #[tokio::test]
    async fn load_from_disk_picks_up_persisted_models() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ModelRegistry::new(dir.path());
        registry.register(sample_model("s2")).await.expect("register succeeds");

        let fresh = ModelRegistry::new(dir.path());
        let count = fresh.load_from_disk().await.expect("load succeeds");
        assert_eq!(count, 1);
        assert!(fresh.get("s2").await.is_some());
    }

    #[tokio::test]
    async fn register_replaces_existing_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ModelRegistry::new(dir.path());
        registry.register(sample_model("s3")).await.expect("register succeeds");

        let mut updated = sample_model("s3");
        updated.name = "renamed".to_string();
        registry.register(updated).await.expect("re-register succeeds");

        let fetched = registry.get("s3").await.expect("model present");
        assert_eq!(fetched.name, "renamed");
    }

    #[tokio::test]
    async fn unknown_model_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ModelRegistry::new(dir.path());
        assert!(registry.get("missing").await.is_none());
    }
}
