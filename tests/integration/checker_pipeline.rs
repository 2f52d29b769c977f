//! End-to-end checks through the service: port probe, ping fallback,
//! plugin capabilities and the persisted trail they leave behind.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use fleetwatch::checker::{CheckerError, UNREACHABLE_MESSAGE};
use fleetwatch::config::{Config, ProbeConfig};
use fleetwatch::plugin::{CapabilityRegistry, DeviceCapability};
use fleetwatch::probe::Pinger;
use fleetwatch::{CheckMethod, Device, DeviceKind};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::helpers::{
    AddressPinger, build_service, build_service_with, localhost_device, test_config, test_device,
};

/// Pinger that never answers, forcing the all-failed path.
struct DeadPinger;

#[async_trait]
impl Pinger for DeadPinger {
    async fn ping(&self, _address: IpAddr, _timeout: std::time::Duration) -> anyhow::Result<Option<f64>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_open_port_short_circuits_to_port_check() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = Config {
        probe: ProbeConfig {
            ports: vec![port],
            port_timeout_ms: 500,
            ..ProbeConfig::default()
        },
        ..Config::default()
    };

    // a dead pinger proves the port verdict never falls through to ping
    let (service, store) = build_service_with(
        config,
        vec![],
        Arc::new(DeadPinger),
        Arc::new(CapabilityRegistry::new()),
    );
    service.registry().insert(localhost_device(1)).await;

    let result = service.check_device(1).await.unwrap();

    assert!(result.available);
    assert_eq!(result.method, CheckMethod::PortCheck);
    assert!(result.latency_ms.is_some());
    assert!(result.error.is_none());
    assert!(!result.write_failed);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_closed_ports_fall_back_to_ping() {
    let (service, _store) = build_service(vec![], Arc::new(AddressPinger::all_up()));
    service.registry().insert(localhost_device(1)).await;

    let result = service.check_device(1).await.unwrap();

    assert!(result.available);
    assert_eq!(result.method, CheckMethod::Ping);
    assert_eq!(result.latency_ms, Some(5.0));
}

#[tokio::test]
async fn test_unreachable_device_is_all_failed() {
    let (service, store) = build_service(vec![], Arc::new(DeadPinger));
    service.registry().insert(test_device(1)).await;

    let result = service.check_device(1).await.unwrap();

    assert!(!result.available);
    assert_eq!(result.method, CheckMethod::AllFailed);
    assert_eq!(result.error.as_deref(), Some(UNREACHABLE_MESSAGE));
    assert!(result.latency_ms.is_none());

    // the failure is persisted like any other result
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_unknown_device_is_a_structured_error() {
    let (service, store) = build_service(vec![], Arc::new(DeadPinger));

    let err = service.check_device(404).await.unwrap_err();
    assert!(matches!(err, CheckerError::DeviceNotFound(404)));
    assert_eq!(store.len().await, 0, "nothing is persisted for unknown ids");
}

struct StatusCapability {
    available: bool,
}

#[async_trait]
impl DeviceCapability for StatusCapability {
    async fn connect(&self, _params: &Value) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn get_status(&self, _params: &Value) -> anyhow::Result<Value> {
        Ok(serde_json::json!({ "is_available": self.available }))
    }
}

#[tokio::test]
async fn test_plugin_device_uses_capability() {
    let plugins = Arc::new(CapabilityRegistry::new());
    plugins
        .bind(
            7,
            Arc::new(StatusCapability { available: true }),
            serde_json::json!({}),
        )
        .await;

    let (service, _store) = build_service_with(
        test_config(),
        vec![],
        Arc::new(DeadPinger),
        plugins,
    );
    service
        .registry()
        .insert(Device {
            kind: DeviceKind::Plugin,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..test_device(7)
        })
        .await;

    let result = service.check_device(7).await.unwrap();

    assert!(result.available);
    assert_eq!(result.method, CheckMethod::Plugin);
}

#[tokio::test]
async fn test_plugin_device_without_binding_is_error() {
    let (service, _store) = build_service(vec![], Arc::new(DeadPinger));
    service
        .registry()
        .insert(Device {
            kind: DeviceKind::Plugin,
            ..test_device(8)
        })
        .await;

    let result = service.check_device(8).await.unwrap();

    assert!(!result.available);
    assert_eq!(result.method, CheckMethod::Error);
    assert!(result.error.is_some());
}
