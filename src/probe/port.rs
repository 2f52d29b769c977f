//! TCP port probe
//!
//! Attempts short-lived connections to every candidate port concurrently.
//! The device counts as available as soon as any one port accepts within
//! the timeout. Refusals, timeouts and OS-level errors all mean "port
//! closed" - they are expected outcomes, not failures.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{instrument, trace};

/// Verdict of one port sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortProbe {
    pub available: bool,

    /// Wall-clock elapsed since probe start; only recorded on success.
    pub latency_ms: Option<f64>,
}

/// Probe every port in `ports` concurrently against `address`.
#[instrument(skip(ports))]
pub async fn probe_ports(address: IpAddr, ports: &[u16], per_port_timeout: Duration) -> PortProbe {
    let start = Instant::now();

    let attempts = ports
        .iter()
        .map(|&port| check_port(address, port, per_port_timeout));
    let available = join_all(attempts).await.into_iter().any(|open| open);

    let latency_ms = available.then(|| start.elapsed().as_secs_f64() * 1000.0);

    trace!("port probe for {address}: available={available}");

    PortProbe {
        available,
        latency_ms,
    }
}

async fn check_port(address: IpAddr, port: u16, connect_timeout: Duration) -> bool {
    match timeout(connect_timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(stream)) => {
            trace!("connected to {address}:{port}");
            drop(stream);
            true
        }
        // refused, unreachable and timed out all mean "closed"
        Ok(Err(_)) | Err(_) => false,
    }
}
