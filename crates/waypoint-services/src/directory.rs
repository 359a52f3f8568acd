//! The peer directory — white/gray lists of known peers.
//!
//! Two-tier model:
//! - White:  peers we have successfully connected to at least once
//! - Gray:   peers known only from gossip, never dialed successfully
//!
//! An address sits in at most one list at a time. New peers always enter
//! gray; promotion to white happens only on a successful outbound
//! connection. Both lists are capacity-bounded — the least-recently-seen
//! entry is evicted on overflow, which bounds memory under adversarial
//! gossip.
//!
//! Concurrency: one RwLock guards both lists, so no reader can ever observe
//! a half-finished promotion (remove from gray + insert into white happen
//! under a single write guard). Readers take snapshots; they never hold the
//! lock across I/O.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use waypoint_core::Zone;

// ── Types ────────────────────────────────────────────────────────────────────

/// Unique key for a peer: the announced address plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub address: String,
    pub port: u16,
}

impl PeerKey {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl std::fmt::Display for PeerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.address.contains(':') && !self.address.starts_with('[') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// How we learned about a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerSource {
    /// The peer announced its own address to us.
    SelfReported,
    /// A third party told us about this peer.
    Gossiped,
}

/// Which list a record currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerList {
    White,
    Gray,
}

/// One known peer.
///
/// `zone` is classified exactly once, when the record is created — it is
/// always consistent with `address` and never re-derived at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub address: String,
    pub port: u16,
    pub zone: Zone,
    pub source: PeerSource,
    pub list: PeerList,
    pub last_seen: SystemTime,
    pub failures: u32,
}

impl PeerRecord {
    pub fn key(&self) -> PeerKey {
        PeerKey::new(self.address.clone(), self.port)
    }
}

/// What `record_failure` did with the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Below threshold — failure counted, nothing moved.
    Counted(u32),
    /// A white peer crossed the threshold and fell back to gray.
    Demoted,
    /// A gray peer crossed the threshold and was dropped entirely.
    Dropped,
    /// The peer is not in the directory.
    Absent,
}

/// Snapshot filter: which lists and zones to include. `None` = all.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub lists: Option<Vec<PeerList>>,
    pub zones: Option<Vec<Zone>>,
}

impl SnapshotFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn lists(lists: &[PeerList]) -> Self {
        Self {
            lists: Some(lists.to_vec()),
            zones: None,
        }
    }

    fn admits(&self, record: &PeerRecord) -> bool {
        if let Some(lists) = &self.lists {
            if !lists.contains(&record.list) {
                return false;
            }
        }
        if let Some(zones) = &self.zones {
            if !zones.contains(&record.zone) {
                return false;
            }
        }
        true
    }
}

// ── Directory ────────────────────────────────────────────────────────────────

struct Lists {
    white: HashMap<PeerKey, PeerRecord>,
    gray: HashMap<PeerKey, PeerRecord>,
}

/// Concurrent store of known peers.
///
/// Cloning is cheap — clones share the same underlying lists, the same way
/// the daemon's other registries are shared between tasks.
pub struct PeerDirectory {
    inner: Arc<RwLock<Lists>>,
    white_capacity: usize,
    gray_capacity: usize,
    failure_threshold: u32,
}

impl PeerDirectory {
    pub fn new(white_capacity: usize, gray_capacity: usize, failure_threshold: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Lists {
                white: HashMap::new(),
                gray: HashMap::new(),
            })),
            white_capacity: white_capacity.max(1),
            gray_capacity: gray_capacity.max(1),
            failure_threshold: failure_threshold.max(1),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lists> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> RwLockReadGuard<'_, Lists> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a peer learned from exchange, or refresh it if already known.
    ///
    /// New peers always enter the gray list; a peer already in white stays
    /// white and just gets its `last_seen` refreshed. The address is
    /// classified here, once — records never carry a stale zone.
    pub fn upsert(&self, address: &str, port: u16, source: PeerSource) {
        let key = PeerKey::new(address, port);
        let now = SystemTime::now();
        let mut lists = self.write();

        if let Some(record) = lists.white.get_mut(&key) {
            record.last_seen = now;
            return;
        }
        if let Some(record) = lists.gray.get_mut(&key) {
            record.last_seen = now;
            // A self-report is the stronger claim; keep it once seen.
            if source == PeerSource::SelfReported {
                record.source = PeerSource::SelfReported;
            }
            return;
        }

        let record = PeerRecord {
            address: address.to_string(),
            port,
            zone: Zone::classify(address),
            source,
            list: PeerList::Gray,
            last_seen: now,
            failures: 0,
        };
        Self::insert_bounded(&mut lists.gray, key, record, self.gray_capacity);
    }

    /// Move a gray peer to white after a successful outbound connection.
    /// No-op if the peer is absent or already white.
    pub fn promote(&self, key: &PeerKey) {
        let mut lists = self.write();
        if lists.white.contains_key(key) {
            if let Some(record) = lists.white.get_mut(key) {
                record.last_seen = SystemTime::now();
                record.failures = 0;
            }
            return;
        }
        let Some(mut record) = lists.gray.remove(key) else {
            return;
        };
        record.list = PeerList::White;
        record.last_seen = SystemTime::now();
        record.failures = 0;
        Self::insert_bounded(&mut lists.white, key.clone(), record, self.white_capacity);
        tracing::debug!(peer = %key, "promoted to white list");
    }

    /// Count a dial failure against a peer.
    ///
    /// At the configured threshold a white peer is demoted to gray (failure
    /// count reset, so it gets a fresh run) and a gray peer is dropped.
    pub fn record_failure(&self, key: &PeerKey) -> FailureOutcome {
        let mut lists = self.write();

        if let Some(record) = lists.white.get_mut(key) {
            record.failures += 1;
            if record.failures < self.failure_threshold {
                return FailureOutcome::Counted(record.failures);
            }
            if let Some(mut record) = lists.white.remove(key) {
                record.list = PeerList::Gray;
                record.failures = 0;
                Self::insert_bounded(&mut lists.gray, key.clone(), record, self.gray_capacity);
            }
            tracing::debug!(peer = %key, "demoted to gray list");
            return FailureOutcome::Demoted;
        }

        if let Some(record) = lists.gray.get_mut(key) {
            record.failures += 1;
            if record.failures < self.failure_threshold {
                return FailureOutcome::Counted(record.failures);
            }
            lists.gray.remove(key);
            tracing::debug!(peer = %key, "dropped from gray list");
            return FailureOutcome::Dropped;
        }

        FailureOutcome::Absent
    }

    /// Point-in-time copy of the directory, filtered.
    ///
    /// Ordering: white before gray, most-recently-seen first within a list,
    /// address as the final tie-break. Taken under the read lock — a
    /// snapshot never contains a torn promote or evict.
    pub fn snapshot(&self, filter: &SnapshotFilter) -> Vec<PeerRecord> {
        let lists = self.read();
        let mut records: Vec<PeerRecord> = lists
            .white
            .values()
            .chain(lists.gray.values())
            .filter(|r| filter.admits(r))
            .cloned()
            .collect();
        drop(lists);

        records.sort_by(|a, b| {
            a.list
                .cmp(&b.list)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.address.cmp(&b.address))
                .then_with(|| a.port.cmp(&b.port))
        });
        records
    }

    /// (white, gray) entry counts.
    pub fn counts(&self) -> (usize, usize) {
        let lists = self.read();
        (lists.white.len(), lists.gray.len())
    }

    pub fn is_empty(&self) -> bool {
        let lists = self.read();
        lists.white.is_empty() && lists.gray.is_empty()
    }

    /// Insert, evicting the least-recently-seen entry if the list is full.
    fn insert_bounded(
        list: &mut HashMap<PeerKey, PeerRecord>,
        key: PeerKey,
        record: PeerRecord,
        capacity: usize,
    ) {
        if list.len() >= capacity && !list.contains_key(&key) {
            let evict = list
                .iter()
                .min_by(|(ka, a), (kb, b)| {
                    a.last_seen
                        .cmp(&b.last_seen)
                        .then_with(|| ka.address.cmp(&kb.address))
                        .then_with(|| ka.port.cmp(&kb.port))
                })
                .map(|(k, _)| k.clone());
            if let Some(evict) = evict {
                list.remove(&evict);
                tracing::trace!(peer = %evict, "evicted least-recently-seen peer");
            }
        }
        list.insert(key, record);
    }
}

impl Clone for PeerDirectory {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            white_capacity: self.white_capacity,
            gray_capacity: self.gray_capacity,
            failure_threshold: self.failure_threshold,
        }
    }
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    address: String,
    port: u16,
    source: PeerSource,
    last_seen_unix: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedDirectory {
    white: Vec<PersistedRecord>,
    gray: Vec<PersistedRecord>,
}

impl PeerDirectory {
    /// Serialize both lists to disk as JSON. Best-effort — logs on failure.
    pub fn save(&self, path: &Path) {
        let lists = self.read();
        let persisted = PersistedDirectory {
            white: lists.white.values().map(persist_record).collect(),
            gray: lists.gray.values().map(persist_record).collect(),
        };
        drop(lists);

        match serde_json::to_string_pretty(&persisted) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist peer lists");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize peer lists");
            }
        }
    }

    /// Load persisted lists. A missing file is normal; a malformed file
    /// logs a warning and leaves the directory empty. Zones are
    /// re-classified on load — loading is ingestion.
    pub fn load(&self, path: &Path) {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to read peer lists");
                return;
            }
        };
        let persisted: PersistedDirectory = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to parse peer lists");
                return;
            }
        };

        let mut lists = self.write();
        let mut loaded = 0usize;
        for p in persisted.white {
            let record = restore_record(p, PeerList::White);
            Self::insert_bounded(&mut lists.white, record.key(), record, self.white_capacity);
            loaded += 1;
        }
        for p in persisted.gray {
            let record = restore_record(p, PeerList::Gray);
            // A tampered file could list one key twice; white wins.
            if lists.white.contains_key(&record.key()) {
                continue;
            }
            Self::insert_bounded(&mut lists.gray, record.key(), record, self.gray_capacity);
            loaded += 1;
        }
        if loaded > 0 {
            tracing::info!(count = loaded, path = %path.display(), "loaded persisted peer lists");
        }
    }
}

/// Rebuild an in-memory record from its persisted form. Loading is
/// ingestion: the zone is classified afresh here.
fn restore_record(p: PersistedRecord, list: PeerList) -> PeerRecord {
    PeerRecord {
        zone: Zone::classify(&p.address),
        source: p.source,
        list,
        last_seen: UNIX_EPOCH + Duration::from_secs(p.last_seen_unix),
        failures: 0,
        address: p.address,
        port: p.port,
    }
}

fn persist_record(record: &PeerRecord) -> PersistedRecord {
    PersistedRecord {
        address: record.address.clone(),
        port: record.port,
        source: record.source,
        last_seen_unix: record
            .last_seen
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    }
}
