//! Configuration system for Waypoint.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $WAYPOINT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/waypoint/config.toml
//!   3. ~/.config/waypoint/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::net::{NetError, ProxyBindingTable};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypointConfig {
    pub network: NetworkConfig,
    pub bootstrap: BootstrapConfig,
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port for p2p hello handshakes. Also the port we advertise.
    pub p2p_port: u16,
    /// UDP port for peer-exchange announcements.
    pub exchange_port: u16,
    /// Local HTTP API port.
    pub api_port: u16,
    /// The address other nodes can reach our p2p port at. Announced via
    /// peer exchange. Empty = we never announce ourselves.
    pub public_address: String,
    /// `host:port` exchange endpoints we announce to on startup and on
    /// every announce interval. Typically the network's seed nodes.
    pub announce_targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// "auto" = pick a bootstrap daemon from the peer directory.
    /// "host:port" = always bootstrap from that address.
    /// "" = bootstrapping disabled.
    pub daemon_address: String,
    /// Optional `host:port` proxy every bootstrap dial is routed through,
    /// whatever the target's zone. Makes all non-unknown zones reachable.
    pub daemon_proxy: String,
    /// Repeatable `zone,host:port` entries binding an outbound proxy to a
    /// zone, e.g. "i2p,127.0.0.1:7656".
    pub tx_proxy: Vec<String>,
    /// Per-candidate dial timeout.
    pub attempt_timeout_secs: u64,
    /// Overall deadline for one bootstrap cycle across all candidates.
    pub cycle_budget_secs: u64,
    /// Pause between unsuccessful bootstrap cycles.
    pub retry_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Max entries in the white list. Oldest entry evicted on overflow.
    pub white_capacity: usize,
    /// Max entries in the gray list.
    pub gray_capacity: usize,
    /// Consecutive dial failures before a white peer is demoted to gray
    /// (and a gray peer is dropped).
    pub failure_threshold: u32,
    /// Where peer lists are persisted between runs. Empty = no persistence.
    pub persist_path: PathBuf,
}

/// What `bootstrap.daemon_address` resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapMode {
    Disabled,
    Auto,
    Fixed(String),
}

impl BootstrapConfig {
    pub fn mode(&self) -> BootstrapMode {
        match self.daemon_address.trim() {
            "" => BootstrapMode::Disabled,
            "auto" => BootstrapMode::Auto,
            addr => BootstrapMode::Fixed(addr.to_string()),
        }
    }

    /// Build the immutable proxy table from `tx_proxy` entries.
    /// An invalid entry is a startup-fatal configuration error.
    pub fn proxy_bindings(&self) -> Result<ProxyBindingTable, NetError> {
        ProxyBindingTable::from_entries(&self.tx_proxy)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            bootstrap: BootstrapConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            p2p_port: 18080,
            exchange_port: 18085,
            api_port: 18089,
            public_address: String::new(),
            announce_targets: Vec::new(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            daemon_address: String::new(),
            daemon_proxy: String::new(),
            tx_proxy: Vec::new(),
            attempt_timeout_secs: 20,
            cycle_budget_secs: 60,
            retry_interval_secs: 30,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            white_capacity: 1000,
            gray_capacity: 5000,
            failure_threshold: 3,
            persist_path: data_dir().join("peers.json"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("waypoint")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("waypoint")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl WaypointConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path, without env overrides. Missing file
    /// yields defaults.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))
        } else {
            Ok(WaypointConfig::default())
        }
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("WAYPOINT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&WaypointConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply WAYPOINT_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WAYPOINT_NETWORK__P2P_PORT") {
            if let Ok(p) = v.parse() {
                self.network.p2p_port = p;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_NETWORK__EXCHANGE_PORT") {
            if let Ok(p) = v.parse() {
                self.network.exchange_port = p;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_NETWORK__PUBLIC_ADDRESS") {
            self.network.public_address = v;
        }
        if let Ok(v) = std::env::var("WAYPOINT_NETWORK__ANNOUNCE_TARGETS") {
            self.network.announce_targets = split_list(&v);
        }
        if let Ok(v) = std::env::var("WAYPOINT_BOOTSTRAP__DAEMON_ADDRESS") {
            self.bootstrap.daemon_address = v;
        }
        if let Ok(v) = std::env::var("WAYPOINT_BOOTSTRAP__DAEMON_PROXY") {
            self.bootstrap.daemon_proxy = v;
        }
        if let Ok(v) = std::env::var("WAYPOINT_BOOTSTRAP__TX_PROXY") {
            self.bootstrap.tx_proxy = split_list(&v);
        }
        if let Ok(v) = std::env::var("WAYPOINT_BOOTSTRAP__ATTEMPT_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.bootstrap.attempt_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_BOOTSTRAP__CYCLE_BUDGET_SECS") {
            if let Ok(n) = v.parse() {
                self.bootstrap.cycle_budget_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_BOOTSTRAP__RETRY_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.bootstrap.retry_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_DIRECTORY__WHITE_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.directory.white_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_DIRECTORY__GRAY_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.directory.gray_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_DIRECTORY__FAILURE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.directory.failure_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("WAYPOINT_DIRECTORY__PERSIST_PATH") {
            self.directory.persist_path = PathBuf::from(v);
        }
    }
}

/// Split a `;`-separated env list, dropping empty segments.
fn split_list(v: &str) -> Vec<String> {
    v.split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
