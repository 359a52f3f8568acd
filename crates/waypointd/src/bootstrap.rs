//! Bootstrap driver — turns selections into connections.
//!
//! Owns the sockets and the clock; all control flow lives in the
//! BootstrapMachine. One cycle: snapshot → select → walk candidates under a
//! per-attempt timeout and an overall cycle budget. Success promotes the
//! peer and ends the driver; exhaustion is logged and retried next
//! interval. The daemon never depends on bootstrap succeeding.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::time::Instant;

use waypoint_core::config::{BootstrapConfig, BootstrapMode};
use waypoint_core::{HostPort, ProxyBindingTable, Zone};
use waypoint_services::{
    select, BootstrapCandidate, BootstrapMachine, BootstrapState, BootstrapStatus, PeerDirectory,
    PeerKey, PeerList, PeerSource, SnapshotFilter,
};

use crate::dial;

pub struct BootstrapDriver {
    directory: PeerDirectory,
    bindings: Arc<ProxyBindingTable>,
    mode: BootstrapMode,
    /// Proxy every bootstrap dial may fall back to, whatever the zone.
    bootstrap_proxy: Option<HostPort>,
    attempt_timeout: Duration,
    cycle_budget: Duration,
    retry_interval: Duration,
    status: BootstrapStatus,
    shutdown: broadcast::Receiver<()>,
}

impl BootstrapDriver {
    pub fn new(
        directory: PeerDirectory,
        bindings: Arc<ProxyBindingTable>,
        config: &BootstrapConfig,
        bootstrap_proxy: Option<HostPort>,
        status: BootstrapStatus,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            directory,
            bindings,
            mode: config.mode(),
            bootstrap_proxy,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs.max(1)),
            cycle_budget: Duration::from_secs(config.cycle_budget_secs.max(1)),
            retry_interval: Duration::from_secs(config.retry_interval_secs.max(1)),
            status,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        if self.mode == BootstrapMode::Disabled {
            tracing::info!("bootstrapping disabled");
            return Ok(());
        }

        let mut interval = tokio::time::interval(self.retry_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("bootstrap driver shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    match self.run_cycle().await {
                        CycleEnd::Connected => return Ok(()),
                        CycleEnd::Shutdown => return Ok(()),
                        CycleEnd::Exhausted => {
                            tracing::info!(
                                retry_secs = self.retry_interval.as_secs(),
                                "no usable bootstrap peer, continuing without one"
                            );
                        }
                    }
                }
            }
        }
    }

    async fn run_cycle(&mut self) -> CycleEnd {
        let mut machine = BootstrapMachine::new();
        machine.start_cycle();
        self.status.note_cycle();
        self.status.update(machine.state());

        let candidates = match &self.mode {
            BootstrapMode::Auto => {
                let snapshot = self.directory.snapshot(&SnapshotFilter::all());
                let selection = select(&snapshot, &self.bindings, self.bootstrap_proxy.as_ref());
                tracing::info!(
                    public_only = selection.public_only,
                    candidates = selection.candidates.len(),
                    "Auto bootstrap: selecting bootstrap daemon"
                );
                selection.candidates
            }
            BootstrapMode::Fixed(address) => self.fixed_candidate(address),
            BootstrapMode::Disabled => Vec::new(),
        };

        machine.begin(candidates);
        self.status.update(machine.state());

        let deadline = Instant::now() + self.cycle_budget;
        while let Some(candidate) = machine.current().cloned() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                tracing::info!(
                    budget_secs = self.cycle_budget.as_secs(),
                    "bootstrap cycle budget spent"
                );
                machine.abandon();
                break;
            };
            let timeout = remaining.min(self.attempt_timeout);

            tracing::info!(
                zone = %candidate.zone,
                proxied = candidate.proxy.is_some(),
                "bootstrapping from {} ...",
                candidate.endpoint()
            );

            let connected = tokio::select! {
                _ = self.shutdown.recv() => return CycleEnd::Shutdown,
                result = dial::dial(&candidate, timeout) => match result {
                    Ok(reply) => {
                        tracing::info!(
                            peer = %candidate.endpoint(),
                            remote_peers = reply.peers,
                            "bootstrap peer connected"
                        );
                        true
                    }
                    Err(e) => {
                        tracing::info!(peer = %candidate.endpoint(), error = %e, "bootstrap attempt failed");
                        false
                    }
                },
            };

            let key = PeerKey::new(candidate.address.clone(), candidate.port);
            if connected {
                self.directory.promote(&key);
            } else {
                self.directory.record_failure(&key);
            }
            machine.outcome(connected);
            self.status.update(machine.state());
        }

        self.status.update(machine.state());
        match machine.state() {
            BootstrapState::Connected { .. } => CycleEnd::Connected,
            _ => CycleEnd::Exhausted,
        }
    }

    /// A fixed bootstrap address is a selection of one. It enters the
    /// directory like any other peer so success can promote it.
    fn fixed_candidate(&self, address: &str) -> Vec<BootstrapCandidate> {
        let endpoint: HostPort = match address.parse() {
            Ok(hp) => hp,
            // Validated at startup; a parse failure here means the config
            // changed out from under us, so just skip the cycle.
            Err(e) => {
                tracing::warn!(error = %e, "fixed bootstrap address unusable");
                return Vec::new();
            }
        };
        let zone = Zone::classify(&endpoint.host);
        if zone == Zone::Unknown {
            tracing::warn!(address, "fixed bootstrap address is unclassifiable, skipping");
            return Vec::new();
        }
        let proxy = self
            .bindings
            .proxy_for(zone)
            .or(self.bootstrap_proxy.as_ref())
            .cloned();
        if zone != Zone::Clearnet && proxy.is_none() {
            tracing::warn!(
                address,
                %zone,
                "fixed bootstrap address needs a proxy and none is configured"
            );
            return Vec::new();
        }

        self.directory
            .upsert(&endpoint.host, endpoint.port, PeerSource::SelfReported);
        vec![BootstrapCandidate {
            address: endpoint.host,
            port: endpoint.port,
            zone,
            list: PeerList::Gray,
            proxy,
        }]
    }
}

enum CycleEnd {
    Connected,
    Exhausted,
    Shutdown,
}
