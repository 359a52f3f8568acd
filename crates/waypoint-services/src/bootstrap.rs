//! Bootstrap connection state machine.
//!
//! The daemon's bootstrap driver owns the sockets; this machine owns the
//! control flow. States: Idle → Selecting → Dialing(index) → Connected or
//! Exhausted. Transitions are pure functions, so every path — including
//! exhaustion and mid-cycle restarts — is testable without a network.
//!
//! Exhaustion is not a failure: bootstrap is best-effort acceleration, and
//! the daemon keeps running with whatever peers it has.

use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::directory::PeerKey;
use crate::selector::BootstrapCandidate;

// ── Machine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    /// No cycle running.
    Idle,
    /// A cycle has started; the selector is computing candidates.
    Selecting,
    /// Working through the candidate list, currently at `index`.
    Dialing { index: usize },
    /// A bootstrap peer answered.
    Connected { peer: PeerKey },
    /// Every candidate failed (or there were none).
    Exhausted,
}

pub struct BootstrapMachine {
    state: BootstrapState,
    candidates: Vec<BootstrapCandidate>,
}

impl Default for BootstrapMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapMachine {
    pub fn new() -> Self {
        Self {
            state: BootstrapState::Idle,
            candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    /// Start a new cycle. Valid from any state — a new cycle abandons
    /// whatever the previous one was doing.
    pub fn start_cycle(&mut self) {
        self.candidates.clear();
        self.state = BootstrapState::Selecting;
    }

    /// Hand the machine the selector's candidate list.
    /// An empty list exhausts the cycle immediately.
    pub fn begin(&mut self, candidates: Vec<BootstrapCandidate>) {
        debug_assert_eq!(self.state, BootstrapState::Selecting);
        self.candidates = candidates;
        self.state = if self.candidates.is_empty() {
            BootstrapState::Exhausted
        } else {
            BootstrapState::Dialing { index: 0 }
        };
    }

    /// The candidate currently being dialed, if any.
    pub fn current(&self) -> Option<&BootstrapCandidate> {
        match self.state {
            BootstrapState::Dialing { index } => self.candidates.get(index),
            _ => None,
        }
    }

    /// Report the outcome of dialing the current candidate.
    /// Success connects; failure advances to the next candidate or exhausts.
    pub fn outcome(&mut self, connected: bool) {
        let BootstrapState::Dialing { index } = self.state else {
            return;
        };
        if connected {
            if let Some(candidate) = self.candidates.get(index) {
                self.state = BootstrapState::Connected {
                    peer: PeerKey::new(candidate.address.clone(), candidate.port),
                };
            }
            return;
        }
        let next = index + 1;
        self.state = if next < self.candidates.len() {
            BootstrapState::Dialing { index: next }
        } else {
            BootstrapState::Exhausted
        };
    }

    /// Abandon the cycle (overall deadline hit, shutdown requested).
    /// Lands in Exhausted — the next cycle starts fresh.
    pub fn abandon(&mut self) {
        self.state = BootstrapState::Exhausted;
    }

    /// Connected or Exhausted — nothing left to do this cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            BootstrapState::Connected { .. } | BootstrapState::Exhausted
        )
    }
}

// ── Shared status ────────────────────────────────────────────────────────────

/// Snapshot of the bootstrap machine for the status API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// "idle", "selecting", "dialing", "connected", "exhausted".
    pub state: String,
    /// `host:port` of the connected bootstrap peer, when connected.
    pub peer: Option<String>,
    /// Completed selection cycles since startup.
    pub cycles: u64,
}

/// Shared, cheaply-cloneable view of the bootstrap driver's progress.
/// The driver writes; the API reads.
#[derive(Clone, Default)]
pub struct BootstrapStatus {
    inner: Arc<RwLock<StatusInner>>,
}

#[derive(Default)]
struct StatusInner {
    state: String,
    peer: Option<String>,
    cycles: u64,
}

impl BootstrapStatus {
    pub fn new() -> Self {
        let status = Self::default();
        status.update(&BootstrapState::Idle);
        status
    }

    pub fn update(&self, state: &BootstrapState) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.state = match state {
            BootstrapState::Idle => "idle",
            BootstrapState::Selecting => "selecting",
            BootstrapState::Dialing { .. } => "dialing",
            BootstrapState::Connected { .. } => "connected",
            BootstrapState::Exhausted => "exhausted",
        }
        .to_string();
        inner.peer = match state {
            BootstrapState::Connected { peer } => Some(peer.to_string()),
            _ => None,
        };
    }

    pub fn note_cycle(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.cycles += 1;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        StatusSnapshot {
            state: inner.state.clone(),
            peer: inner.peer.clone(),
            cycles: inner.cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::PeerList;
    use waypoint_core::Zone;

    fn candidate(address: &str) -> BootstrapCandidate {
        BootstrapCandidate {
            address: address.to_string(),
            port: 18080,
            zone: Zone::Clearnet,
            list: PeerList::Gray,
            proxy: None,
        }
    }

    #[test]
    fn starts_idle() {
        let machine = BootstrapMachine::new();
        assert_eq!(*machine.state(), BootstrapState::Idle);
        assert!(machine.current().is_none());
    }

    #[test]
    fn empty_selection_exhausts_immediately() {
        let mut machine = BootstrapMachine::new();
        machine.start_cycle();
        assert_eq!(*machine.state(), BootstrapState::Selecting);
        machine.begin(Vec::new());
        assert_eq!(*machine.state(), BootstrapState::Exhausted);
        assert!(machine.is_terminal());
    }

    #[test]
    fn success_on_first_candidate_connects() {
        let mut machine = BootstrapMachine::new();
        machine.start_cycle();
        machine.begin(vec![candidate("1.2.3.4"), candidate("5.6.7.8")]);

        assert_eq!(machine.current().unwrap().address, "1.2.3.4");
        machine.outcome(true);
        assert_eq!(
            *machine.state(),
            BootstrapState::Connected {
                peer: PeerKey::new("1.2.3.4", 18080)
            }
        );
        assert!(machine.is_terminal());
    }

    #[test]
    fn failures_walk_the_list_then_exhaust() {
        let mut machine = BootstrapMachine::new();
        machine.start_cycle();
        machine.begin(vec![candidate("1.1.1.1"), candidate("2.2.2.2")]);

        machine.outcome(false);
        assert_eq!(machine.current().unwrap().address, "2.2.2.2");
        machine.outcome(false);
        assert_eq!(*machine.state(), BootstrapState::Exhausted);
    }

    #[test]
    fn failure_then_success_connects_to_later_candidate() {
        let mut machine = BootstrapMachine::new();
        machine.start_cycle();
        machine.begin(vec![candidate("1.1.1.1"), candidate("2.2.2.2")]);

        machine.outcome(false);
        machine.outcome(true);
        assert_eq!(
            *machine.state(),
            BootstrapState::Connected {
                peer: PeerKey::new("2.2.2.2", 18080)
            }
        );
    }

    #[test]
    fn new_cycle_abandons_previous_state() {
        let mut machine = BootstrapMachine::new();
        machine.start_cycle();
        machine.begin(vec![candidate("1.1.1.1")]);
        machine.outcome(false);
        assert_eq!(*machine.state(), BootstrapState::Exhausted);

        machine.start_cycle();
        machine.begin(vec![candidate("2.2.2.2")]);
        assert_eq!(machine.current().unwrap().address, "2.2.2.2");
    }

    #[test]
    fn abandon_is_terminal_and_recoverable() {
        let mut machine = BootstrapMachine::new();
        machine.start_cycle();
        machine.begin(vec![candidate("1.1.1.1"), candidate("2.2.2.2")]);
        machine.abandon();
        assert_eq!(*machine.state(), BootstrapState::Exhausted);

        machine.start_cycle();
        machine.begin(vec![candidate("3.3.3.3")]);
        assert_eq!(machine.current().unwrap().address, "3.3.3.3");
    }

    #[test]
    fn outcome_outside_dialing_is_ignored() {
        let mut machine = BootstrapMachine::new();
        machine.outcome(true);
        assert_eq!(*machine.state(), BootstrapState::Idle);
    }

    #[test]
    fn status_reflects_machine_states() {
        let status = BootstrapStatus::new();
        assert_eq!(status.snapshot().state, "idle");

        status.update(&BootstrapState::Dialing { index: 0 });
        assert_eq!(status.snapshot().state, "dialing");
        assert_eq!(status.snapshot().peer, None);

        status.update(&BootstrapState::Connected {
            peer: PeerKey::new("1.2.3.4", 18080),
        });
        let snap = status.snapshot();
        assert_eq!(snap.state, "connected");
        assert_eq!(snap.peer.as_deref(), Some("1.2.3.4:18080"));

        status.note_cycle();
        assert_eq!(status.snapshot().cycles, 1);
    }
}
