//! Reachability probes
//!
//! A probe is a single reachability test against one address. Two kinds
//! exist: a concurrent TCP-connect sweep over a candidate port list, and
//! an ICMP-style echo dispatched to a bounded blocking worker pool.

pub mod ping;
pub mod port;

pub use ping::{PingProbe, Pinger, SystemPinger, probe_ping};
pub use port::{PortProbe, probe_ports};
