//! Companion device lookup
//!
//! Some fans only act on commands that appear to come from a remote they
//! were bound to. The directory maps a target device to that remote's
//! address so it can be used as the packet source.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Resolves the bound companion address for a target device
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Companion address for `device_id`, if one is bound
    async fn bound_device(&self, device_id: &str) -> Option<String>;
}

/// In-memory bindings
#[derive(Debug, Default)]
pub struct StaticDirectory {
    bindings: RwLock<HashMap<String, String>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(device, companion)` pairs
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            bindings: RwLock::new(
                pairs
                    .into_iter()
                    .map(|(device, companion)| (device.into(), companion.into()))
                    .collect(),
            ),
        }
    }

    /// Bind a companion to a device, returning the previous binding
    pub async fn bind(&self, device_id: &str, companion_id: &str) -> Option<String> {
        debug!("[DIRECTORY] {} bound to {}", device_id, companion_id);
        self.bindings
            .write()
            .await
            .insert(device_id.to_string(), companion_id.to_string())
    }

    /// Remove a binding
    pub async fn unbind(&self, device_id: &str) -> Option<String> {
        self.bindings.write().await.remove(device_id)
    }

}

#[async_trait]
impl DeviceDirectory for StaticDirectory {
    async fn bound_device(&self, device_id: &str) -> Option<String> {
        self.bindings.read().await.get(device_id).cloned()
    }
}
