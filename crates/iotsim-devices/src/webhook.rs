//! Process-wide deviceId → webhook callback mapping.
//!
//! The source kept this as a bare module-level dictionary shared between the
//! HTTP server and proxy devices. Here it is an explicitly owned registry,
//! constructed once and handed to both the API router and the device
//! manager: writers (bind/unbind) take the lock, lookups at request time
//! only need a read guard and never block each other.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

pub type WebhookCallback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct WebhookRegistry {
    inner: Arc<RwLock<HashMap<String, WebhookCallback>>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        WebhookRegistry::default()
    }

    pub fn register(&self, device_id: &str, callback: WebhookCallback) {
        self.inner
            .write()
            .expect("webhook registry poisoned")
            .insert(device_id.to_string(), callback);
    }

    pub fn unregister(&self, device_id: &str) {
        self.inner
            .write()
            .expect("webhook registry poisoned")
            .remove(device_id);
    }

    /// Look up and invoke the handler registered for `device_id`. Returns
    /// `false` (and does nothing) if no handler is registered — the caller
    /// maps that to a 404.
    pub fn invoke(&self, device_id: &str, payload: Value) -> bool {
        let callback = self
            .inner
            .read()
            .expect("webhook registry poisoned")
            .get(device_id)
            .cloned();
        match callback {
            Some(callback) => {
                callback(payload);
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self, device_id: &str) -> bool {
        self.inner
            .read()
            .expect("webhook registry poisoned")
            .contains_key(device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn invoke_calls_registered_handler() {
        let registry = WebhookRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.register("dev-1", Arc::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(registry.invoke("dev-1", serde_json::json!({})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invoke_returns_false_for_unregistered_device() {
        let registry = WebhookRegistry::new();
        assert!(!registry.invoke("unknown", serde_json::json!({})));
    }

    #[test]
    fn unregister_removes_handler() {
        let registry = WebhookRegistry::new();
        registry.register("dev-1", Arc::new(|_| {}));
        registry.unregister("dev-1");
        assert!(!registry.is_bound("dev-1"));
    }
}
