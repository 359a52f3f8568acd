//! Auto-bootstrap candidate selection.
//!
//! Pure function over a directory snapshot: given the proxy bindings and the
//! optional dedicated bootstrap proxy, decide whether the node may offer
//! cross-zone bootstrap candidates (`public_only = false`) and produce the
//! ordered candidate list. No I/O, no shared state — every decision here is
//! reproducible from its inputs.

use waypoint_core::{HostPort, ProxyBindingTable, Zone};

use crate::directory::{PeerList, PeerRecord};

/// A bootstrap target derived for one cycle. Never persisted — the next
/// cycle derives a fresh list from a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapCandidate {
    pub address: String,
    pub port: u16,
    pub zone: Zone,
    pub list: PeerList,
    /// Dial through this proxy; None = direct.
    pub proxy: Option<HostPort>,
}

impl BootstrapCandidate {
    /// `host:port` form used in log lines and dial targets.
    pub fn endpoint(&self) -> String {
        HostPort::new(self.address.clone(), self.port).to_string()
    }
}

/// Outcome of one selection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// True when only clearnet candidates are eligible. This is the legacy
    /// default: it stays true unless some proxied zone actually has a peer.
    pub public_only: bool,
    pub candidates: Vec<BootstrapCandidate>,
}

/// Decide the query mode and candidate list for one bootstrap cycle.
///
/// Reachable zones are clearnet (always) plus every zone with a proxy
/// binding; a configured bootstrap proxy makes every classifiable zone
/// reachable, since all bootstrap dials may be routed through it.
///
/// `public_only` flips to false only when at least one reachable
/// non-clearnet zone has an entry in the snapshot — a node with proxies but
/// purely clearnet knowledge behaves exactly like a legacy node.
///
/// Ordering: white before gray, most-recently-seen first within a list,
/// then clearnet before i2p before tor on equal timestamps, address as the
/// final tie-break. Unknown-zone entries and entries in unreachable zones
/// are never offered.
pub fn select(
    snapshot: &[PeerRecord],
    bindings: &ProxyBindingTable,
    bootstrap_proxy: Option<&HostPort>,
) -> Selection {
    let reachable = |zone: Zone| -> bool {
        match zone {
            Zone::Clearnet => true,
            Zone::I2p | Zone::Tor => {
                bindings.proxy_for(zone).is_some() || bootstrap_proxy.is_some()
            }
            Zone::Unknown => false,
        }
    };

    let public_only = !snapshot
        .iter()
        .any(|r| r.zone != Zone::Clearnet && r.zone != Zone::Unknown && reachable(r.zone));

    let mut eligible: Vec<&PeerRecord> = snapshot
        .iter()
        .filter(|r| r.zone != Zone::Unknown)
        .filter(|r| reachable(r.zone))
        .filter(|r| !public_only || r.zone == Zone::Clearnet)
        .collect();

    // Stable, documented candidate order; the snapshot's own order is not
    // relied upon.
    eligible.sort_by(|a, b| {
        a.list
            .cmp(&b.list)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
            .then_with(|| a.zone.cmp(&b.zone))
            .then_with(|| a.address.cmp(&b.address))
            .then_with(|| a.port.cmp(&b.port))
    });

    let candidates = eligible
        .into_iter()
        .map(|r| BootstrapCandidate {
            address: r.address.clone(),
            port: r.port,
            zone: r.zone,
            list: r.list,
            proxy: bindings.proxy_for(r.zone).or(bootstrap_proxy).cloned(),
        })
        .collect();

    Selection {
        public_only,
        candidates,
    }
}
