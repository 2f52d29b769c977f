//! Device directory and fleet registry
//!
//! The authoritative device list lives in an external service; the core
//! keeps a local registry that a recurring sync task refreshes. Devices
//! that disappear upstream are soft-deactivated, never deleted, so their
//! check history stays joinable.

use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::{Device, DeviceKind};

/// Source of truth for the fleet.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn list_devices(&self) -> anyhow::Result<Vec<Device>>;
}

/// Wire format of the main system's device endpoint.
#[derive(Debug, Deserialize)]
struct DirectoryDevice {
    id: i64,
    name: String,
    ip_address: IpAddr,
    #[serde(default = "default_is_active")]
    is_active: bool,
    #[serde(default)]
    kind: DeviceKind,
}

fn default_is_active() -> bool {
    true
}

impl From<DirectoryDevice> for Device {
    fn from(wire: DirectoryDevice) -> Self {
        Device {
            id: wire.id,
            name: wire.name,
            address: wire.ip_address,
            active: wire.is_active,
            kind: wire.kind,
        }
    }
}

/// HTTP client for the main system's device API.
pub struct HttpDeviceDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeviceDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DeviceDirectory for HttpDeviceDirectory {
    #[instrument(skip(self))]
    async fn list_devices(&self) -> anyhow::Result<Vec<Device>> {
        let url = format!("{}/api/v1/devices/", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("device directory request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("device directory returned HTTP {}", response.status());
        }

        let devices: Vec<DirectoryDevice> = response
            .json()
            .await
            .context("failed to decode device directory response")?;

        debug!("directory returned {} devices", devices.len());

        Ok(devices.into_iter().map(Device::from).collect())
    }
}

/// Local fleet cache, refreshed by the sync task.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<i64, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the currently active fleet.
    ///
    /// Checks launched from one snapshot never see devices added later;
    /// they join the next batch.
    pub async fn active_snapshot(&self) -> Vec<Device> {
        let devices = self.devices.read().await;
        let mut active: Vec<Device> = devices.values().filter(|d| d.active).cloned().collect();
        active.sort_by_key(|d| d.id);
        active
    }

    pub async fn get(&self, device_id: i64) -> Option<Device> {
        self.devices.read().await.get(&device_id).cloned()
    }

    pub async fn insert(&self, device: Device) {
        self.devices.write().await.insert(device.id, device);
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Pull the upstream device list and reconcile the local cache.
    ///
    /// Upstream devices are upserted; local devices missing upstream are
    /// soft-deactivated. Returns the number of devices seen upstream.
    #[instrument(skip_all)]
    pub async fn sync_from(&self, directory: &dyn DeviceDirectory) -> anyhow::Result<usize> {
        let upstream = directory.list_devices().await?;
        let upstream_count = upstream.len();

        let mut devices = self.devices.write().await;

        let upstream_ids: std::collections::HashSet<i64> =
            upstream.iter().map(|d| d.id).collect();

        for device in upstream {
            if !devices.contains_key(&device.id) {
                info!("new device added: {} (ID: {})", device.name, device.id);
            }
            devices.insert(device.id, device);
        }

        for device in devices.values_mut() {
            if device.active && !upstream_ids.contains(&device.id) {
                info!("device deactivated: {} (ID: {})", device.name, device.id);
                device.active = false;
            }
        }

        debug!("device sync complete, {} devices upstream", upstream_count);
        Ok(upstream_count)
    }
}
