//! waypoint-services — the peer directory and the bootstrap decision engine.
//!
//! Everything here is daemon-agnostic: the directory is a concurrent store,
//! the selector is a pure function over a directory snapshot, and the
//! bootstrap machine is a pure state machine. All socket work lives in
//! waypointd.

pub mod bootstrap;
pub mod directory;
pub mod selector;

pub use bootstrap::{BootstrapMachine, BootstrapState, BootstrapStatus, StatusSnapshot};
pub use directory::{
    FailureOutcome, PeerDirectory, PeerKey, PeerList, PeerRecord, PeerSource, SnapshotFilter,
};
pub use selector::{select, BootstrapCandidate, Selection};
