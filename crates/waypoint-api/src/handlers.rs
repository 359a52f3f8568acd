//! HTTP API handlers — exposes daemon state as JSON.
//!
//! The `public_only` field on the node-listing methods is optional and
//! defaults to true. That default is load-bearing: clients that predate
//! zone awareness send no field at all and must keep getting clearnet-only
//! results. A request with no JSON body at all means the same thing.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use waypoint_core::{ProxyBindingTable, Zone};
use waypoint_services::{
    BootstrapStatus, PeerDirectory, PeerList, PeerRecord, SnapshotFilter, StatusSnapshot,
};

#[derive(Clone)]
pub struct ApiState {
    pub directory: PeerDirectory,
    pub bindings: Arc<ProxyBindingTable>,
    pub bootstrap_status: BootstrapStatus,
    pub started: Instant,
}

/// Request shape shared by the node-listing methods.
///
/// `public_only` is an explicit optional — absent means true. Anything that
/// is present but not a boolean is a malformed request and is rejected by
/// the JSON extractor before the handler runs; directory state is untouched.
#[derive(Debug, Default, Deserialize)]
pub struct NodeListRequest {
    pub public_only: Option<bool>,
}

impl NodeListRequest {
    fn public_only(&self) -> bool {
        self.public_only.unwrap_or(true)
    }
}

fn filter_for(public_only: bool) -> SnapshotFilter {
    SnapshotFilter {
        lists: None,
        zones: public_only.then(|| vec![Zone::Clearnet]),
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

// ── /get_public_nodes ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PublicNode {
    pub host: String,
    pub port: u16,
    pub last_seen: u64,
}

#[derive(Serialize)]
pub struct PublicNodesResponse {
    pub white: Vec<PublicNode>,
    pub gray: Vec<PublicNode>,
}

fn public_node(record: &PeerRecord) -> PublicNode {
    PublicNode {
        host: record.address.clone(),
        port: record.port,
        last_seen: unix_secs(record.last_seen),
    }
}

pub async fn handle_get_public_nodes(
    State(state): State<ApiState>,
    body: Option<Json<NodeListRequest>>,
) -> Json<PublicNodesResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let snapshot = state.directory.snapshot(&filter_for(request.public_only()));

    let mut white = Vec::new();
    let mut gray = Vec::new();
    for record in &snapshot {
        match record.list {
            PeerList::White => white.push(public_node(record)),
            PeerList::Gray => gray.push(public_node(record)),
        }
    }
    // An empty directory is an empty response, never an error.
    Json(PublicNodesResponse { white, gray })
}

// ── /get_peer_list ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeerListEntry {
    pub host: String,
    pub port: u16,
    pub zone: String,
    pub source: String,
    pub last_seen: u64,
    pub failures: u32,
}

#[derive(Serialize)]
pub struct PeerListResponse {
    pub white_list: Vec<PeerListEntry>,
    pub gray_list: Vec<PeerListEntry>,
}

fn peer_list_entry(record: &PeerRecord) -> PeerListEntry {
    PeerListEntry {
        host: record.address.clone(),
        port: record.port,
        zone: record.zone.to_string(),
        source: format!("{:?}", record.source),
        last_seen: unix_secs(record.last_seen),
        failures: record.failures,
    }
}

pub async fn handle_get_peer_list(
    State(state): State<ApiState>,
    body: Option<Json<NodeListRequest>>,
) -> Json<PeerListResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let snapshot = state.directory.snapshot(&filter_for(request.public_only()));

    let mut white_list = Vec::new();
    let mut gray_list = Vec::new();
    for record in &snapshot {
        match record.list {
            PeerList::White => white_list.push(peer_list_entry(record)),
            PeerList::Gray => gray_list.push(peer_list_entry(record)),
        }
    }
    Json(PeerListResponse {
        white_list,
        gray_list,
    })
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub white_peers: usize,
    pub gray_peers: usize,
    pub proxied_zones: Vec<String>,
    pub bootstrap: StatusSnapshot,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let (white_peers, gray_peers) = state.directory.counts();
    Json(StatusResponse {
        uptime_secs: state.started.elapsed().as_secs(),
        white_peers,
        gray_peers,
        proxied_zones: state
            .bindings
            .bound_zones()
            .iter()
            .map(|z| z.to_string())
            .collect(),
        bootstrap: state.bootstrap_status.snapshot(),
    })
}
