//! Settings store
//!
//! Key-value settings written through the external settings API and read
//! here. The only key the core cares about is the check interval; values
//! are strings on the wire, so parsing falls back to the default instead
//! of failing a whole check cycle over a malformed setting.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

pub const CHECK_INTERVAL_KEY: &str = "availability_check_interval_minutes";

pub const DEFAULT_CHECK_INTERVAL_MINUTES: u32 = 1;

/// One day in minutes; the scheduler never waits longer than this.
pub const MAX_CHECK_INTERVAL_MINUTES: u32 = 1440;

/// Clamp a requested interval into the supported [1, 1440] range.
pub fn clamp_interval(minutes: u32) -> u32 {
    minutes.clamp(1, MAX_CHECK_INTERVAL_MINUTES)
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: String);
}

/// In-memory settings store.
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.values.write().await.insert(key.to_string(), value);
    }
}

/// Read the check interval, falling back to the default on a missing or
/// unparsable value.
pub async fn get_check_interval(store: &dyn SettingsStore) -> u32 {
    let raw = store.get(CHECK_INTERVAL_KEY).await;
    raw.and_then(|value| value.parse().ok())
        .map(clamp_interval)
        .unwrap_or(DEFAULT_CHECK_INTERVAL_MINUTES)
}

/// Persist the check interval, clamped to the supported range. Returns
/// the value actually stored.
pub async fn set_check_interval(store: &dyn SettingsStore, minutes: u32) -> u32 {
    let clamped = clamp_interval(minutes);
    store.set(CHECK_INTERVAL_KEY, clamped.to_string()).await;
    clamped
}
