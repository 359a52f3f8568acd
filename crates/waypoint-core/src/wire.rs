//! Waypoint wire format — on-wire types for peer exchange.
//!
//! These types ARE the protocol. Every field, every size, every reserved
//! byte is part of the wire format; changing anything here is a breaking
//! change for every deployed node.
//!
//! All types are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for safe, allocation-free serialization. There is no
//! unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// First four bytes of every exchange datagram ("WAYP").
pub const EXCHANGE_MAGIC: [u8; 4] = *b"WAYP";

/// Wire format version. A receiver seeing an unknown version drops the
/// datagram silently.
pub const WIRE_VERSION: u8 = 1;

/// Seconds between self-announcements.
pub const ANNOUNCE_INTERVAL_SECS: u64 = 60;

/// Maximum address length representable on the wire. Long enough for any
/// b32.i2p (60 bytes) or onion-v3 (62 bytes) name and for practical DNS
/// hostnames; anything longer cannot be announced and is dropped.
pub const MAX_WIRE_ADDR: usize = 192;

/// `source` value: the sender is telling us about a third peer it heard of.
pub const SOURCE_GOSSIPED: u8 = 0;
/// `source` value: the sender is announcing its own reachable address.
pub const SOURCE_SELF: u8 = 1;

// ── Peer announcement ────────────────────────────────────────────────────────

/// One exchange datagram: "this address speaks waypoint on this port".
///
/// Sent over UDP to a peer's exchange port, either for the sender itself
/// (`source = SOURCE_SELF`) or for a rumored third party
/// (`source = SOURCE_GOSSIPED`). Receivers classify the address and file the
/// peer into the gray list.
///
/// Wire size: 202 bytes.
#[derive(Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PeerAnnouncement {
    /// Must equal EXCHANGE_MAGIC.
    pub magic: [u8; 4],

    /// Must equal WIRE_VERSION.
    pub version: u8,

    /// SOURCE_SELF or SOURCE_GOSSIPED. Unknown values are treated as
    /// gossiped — the weaker claim.
    pub source: u8,

    /// P2P port the announced peer listens on.
    pub port: u16,

    /// Number of meaningful bytes in `addr`.
    pub addr_len: u16,

    /// The announced address, UTF-8, unterminated. Bytes past `addr_len`
    /// must be zero.
    pub addr: [u8; MAX_WIRE_ADDR],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(PeerAnnouncement, [u8; 202]);

impl PeerAnnouncement {
    /// Build an announcement for `address:port`.
    ///
    /// The address must be non-empty, printable ASCII-or-UTF-8 without
    /// control bytes, and fit the wire buffer.
    pub fn new(address: &str, port: u16, source: u8) -> Result<Self, WireError> {
        if address.is_empty() {
            return Err(WireError::EmptyAddress);
        }
        if address.len() > MAX_WIRE_ADDR {
            return Err(WireError::AddressTooLong(address.len()));
        }
        if address.bytes().any(|b| b.is_ascii_control()) {
            return Err(WireError::ControlBytesInAddress);
        }
        let mut addr = [0u8; MAX_WIRE_ADDR];
        addr[..address.len()].copy_from_slice(address.as_bytes());
        Ok(Self {
            magic: EXCHANGE_MAGIC,
            version: WIRE_VERSION,
            source,
            port,
            addr_len: address.len() as u16,
            addr,
        })
    }

    /// Magic and version check. Datagrams failing this are not ours.
    pub fn is_valid(&self) -> bool {
        self.magic == EXCHANGE_MAGIC
            && self.version == WIRE_VERSION
            && (self.addr_len as usize) <= MAX_WIRE_ADDR
            && self.addr_len > 0
    }

    /// The announced address as a string slice.
    pub fn address(&self) -> Result<&str, WireError> {
        let len = self.addr_len as usize;
        if len == 0 || len > MAX_WIRE_ADDR {
            return Err(WireError::EmptyAddress);
        }
        std::str::from_utf8(&self.addr[..len]).map_err(|_| WireError::InvalidUtf8)
    }

    /// Parse a received datagram. Returns None for anything that is not a
    /// valid announcement — the exchange listener drops those at trace level.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let ann = Self::read_from_prefix(buf)?;
        if !ann.is_valid() {
            return None;
        }
        // Reject datagrams whose address bytes are not clean UTF-8 up front
        // so downstream code can rely on address() succeeding.
        ann.address().ok()?;
        Some(ann)
    }

    pub fn is_self_reported(&self) -> bool {
        self.source == SOURCE_SELF
    }
}

impl std::fmt::Debug for PeerAnnouncement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // copy packed fields to locals to avoid unaligned references
        let port = self.port;
        let source = self.source;
        f.debug_struct("PeerAnnouncement")
            .field("addr", &self.address().unwrap_or("<invalid>"))
            .field("port", &port)
            .field("source", &source)
            .finish()
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("announced address is empty")]
    EmptyAddress,
    #[error("announced address is {0} bytes, wire maximum is {MAX_WIRE_ADDR}")]
    AddressTooLong(usize),
    #[error("announced address contains control bytes")]
    ControlBytesInAddress,
    #[error("announced address is not valid UTF-8")]
    InvalidUtf8,
}
