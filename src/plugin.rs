//! Plugin capability boundary
//!
//! Non-network devices are checked through a capability object instead of
//! the port/ping chain. Loading and validating plugin code happens in an
//! external, sandboxed collaborator; the core only sees this trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

/// What a device plugin can do.
///
/// `connect` and `get_status` are the minimum surface every plugin
/// provides; metrics and arbitrary operations are optional extras.
#[async_trait]
pub trait DeviceCapability: Send + Sync {
    /// Try to reach the device. `Ok(false)` is a clean "not reachable".
    async fn connect(&self, params: &Value) -> anyhow::Result<bool>;

    /// Rich status payload. Implementations that report availability
    /// include an `is_available` boolean and an optional `error` string.
    async fn get_status(&self, params: &Value) -> anyhow::Result<Value>;

    async fn get_metrics(&self, _params: &Value) -> anyhow::Result<Value> {
        Err(anyhow::anyhow!("plugin does not expose metrics"))
    }

    async fn execute_operation(&self, operation: &str, _params: &Value) -> anyhow::Result<Value> {
        Err(anyhow::anyhow!("unsupported plugin operation: {operation}"))
    }
}

/// A capability bound to one device, with its connection parameters.
#[derive(Clone)]
pub struct PluginBinding {
    pub capability: Arc<dyn DeviceCapability>,
    pub params: Value,
}

/// Maps plugin-kind devices to their capability bindings.
#[derive(Default)]
pub struct CapabilityRegistry {
    bindings: RwLock<HashMap<i64, PluginBinding>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind(&self, device_id: i64, capability: Arc<dyn DeviceCapability>, params: Value) {
        self.bindings.write().await.insert(
            device_id,
            PluginBinding { capability, params },
        );
    }

    pub async fn binding_for(&self, device_id: i64) -> Option<PluginBinding> {
        self.bindings.read().await.get(&device_id).cloned()
    }

    pub async fn unbind(&self, device_id: i64) {
        self.bindings.write().await.remove(&device_id);
    }
}
