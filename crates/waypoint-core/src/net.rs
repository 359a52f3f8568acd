//! Network zones and proxy bindings.
//!
//! Every peer address belongs to exactly one zone, derived from address
//! syntax alone. Classification never touches the network: an address is
//! classified once at ingestion and the result is cached on the peer record.

use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Zone ─────────────────────────────────────────────────────────────────────

/// The transport class a peer address requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Public IPv4/IPv6 or a plain DNS hostname. Directly dialable.
    Clearnet,
    /// I2P hidden service (`*.b32.i2p`). Needs a SAM/SOCKS proxy.
    I2p,
    /// Tor hidden service (`*.onion`). Needs a SOCKS proxy.
    Tor,
    /// Matches no known pattern. Stored for diagnostics, never dialed.
    Unknown,
}

impl Zone {
    /// Classify an address string.
    ///
    /// Rules, in order: `.b32.i2p` suffix, `.onion` suffix (both
    /// case-insensitive), IPv4 dotted-quad, IPv6 literal (optionally
    /// bracketed), DNS hostname. Anything else is `Unknown`.
    ///
    /// Deterministic and idempotent. The port must already be stripped —
    /// `classify` sees only the host part.
    pub fn classify(address: &str) -> Zone {
        let lower = address.to_ascii_lowercase();
        if lower.ends_with(".b32.i2p") {
            return Zone::I2p;
        }
        if lower.ends_with(".onion") {
            return Zone::Tor;
        }
        if address.parse::<Ipv4Addr>().is_ok() {
            return Zone::Clearnet;
        }
        let unbracketed = address
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(address);
        if unbracketed.parse::<Ipv6Addr>().is_ok() {
            return Zone::Clearnet;
        }
        if is_valid_hostname(&lower) {
            return Zone::Clearnet;
        }
        Zone::Unknown
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zone::Clearnet => "clearnet",
            Zone::I2p => "i2p",
            Zone::Tor => "tor",
            Zone::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for Zone {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clearnet" => Ok(Zone::Clearnet),
            "i2p" => Ok(Zone::I2p),
            "tor" => Ok(Zone::Tor),
            "unknown" => Ok(Zone::Unknown),
            other => Err(NetError::UnknownZoneName(other.to_string())),
        }
    }
}

/// RFC-style hostname check: dot-separated labels of `[a-z0-9-]`,
/// no label starting or ending with `-`, and a TLD that is not all digits
/// (an all-digit TLD would let malformed IPv4 strings pass as hostnames).
fn is_valid_hostname(lower: &str) -> bool {
    if lower.is_empty() || lower.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = lower.split('.').collect();
    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return false;
        }
    }
    let Some(tld) = labels.last() else {
        return false;
    };
    tld.bytes().any(|b| !b.is_ascii_digit())
}

// ── HostPort ─────────────────────────────────────────────────────────────────

/// A dialable `host:port` endpoint. IPv6 hosts are written in brackets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for HostPort {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| NetError::InvalidEndpoint(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| NetError::InvalidEndpoint(s.to_string()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(NetError::InvalidEndpoint(s.to_string()));
        }
        Ok(HostPort::new(host, port))
    }
}

// ── Proxy bindings ───────────────────────────────────────────────────────────

/// Which outbound proxy, if any, reaches each zone.
///
/// Built once at startup from `zone,host:port` config entries and immutable
/// afterwards — concurrent readers need no lock. A zone with no binding is
/// dialed directly (only meaningful for clearnet).
#[derive(Debug, Clone, Default)]
pub struct ProxyBindingTable {
    bindings: HashMap<Zone, HostPort>,
}

impl ProxyBindingTable {
    /// Parse `zone,host:port` entries (the repeatable `tx_proxy` config key).
    ///
    /// Rejects a binding for the `unknown` zone — there is no transport that
    /// reaches an unclassifiable address — and duplicate bindings for the
    /// same zone. Either error is fatal at startup.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, NetError> {
        let mut bindings = HashMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            let (zone_str, endpoint_str) = entry
                .split_once(',')
                .ok_or_else(|| NetError::InvalidProxyEntry(entry.to_string()))?;
            let zone: Zone = zone_str.parse()?;
            if zone == Zone::Unknown {
                return Err(NetError::UnroutableZone);
            }
            let endpoint: HostPort = endpoint_str.trim().parse()?;
            if bindings.insert(zone, endpoint).is_some() {
                return Err(NetError::DuplicateBinding(zone));
            }
        }
        Ok(Self { bindings })
    }

    /// The proxy bound to `zone`, if any.
    pub fn proxy_for(&self, zone: Zone) -> Option<&HostPort> {
        self.bindings.get(&zone)
    }

    /// Zones with an explicit proxy binding, in stable order.
    pub fn bound_zones(&self) -> Vec<Zone> {
        let mut zones: Vec<Zone> = self.bindings.keys().copied().collect();
        zones.sort();
        zones
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("invalid endpoint '{0}', expected host:port")]
    InvalidEndpoint(String),
    #[error("unknown zone name '{0}'")]
    UnknownZoneName(String),
    #[error("invalid proxy entry '{0}', expected zone,host:port")]
    InvalidProxyEntry(String),
    #[error("cannot bind a proxy to the unknown zone")]
    UnroutableZone,
    #[error("duplicate proxy binding for zone {0}")]
    DuplicateBinding(Zone),
}
