//! waypoint-core — shared types, wire format, and configuration.
//! All other Waypoint crates depend on this one.

pub mod config;
pub mod net;
pub mod wire;

pub use net::{HostPort, ProxyBindingTable, Zone};
