//! Peer exchange — UDP announcements in, UDP announcements out, and the
//! TCP hello listener.
//!
//! The exchange listener is the directory's only gossip-facing write path:
//! valid announcements are classified and filed into the gray list. A
//! per-source rate table bounds how fast any single host can push
//! announcements at us; the directory's capacity bound takes care of the
//! rest.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast;
use zerocopy::AsBytes;

use waypoint_core::wire::{
    PeerAnnouncement, ANNOUNCE_INTERVAL_SECS, SOURCE_GOSSIPED, SOURCE_SELF, WIRE_VERSION,
};
use waypoint_core::HostPort;
use waypoint_services::{PeerDirectory, PeerList, PeerSource, SnapshotFilter};

/// Announcements accepted from one source address per window.
const RATE_LIMIT_PER_WINDOW: u32 = 16;
const RATE_WINDOW: Duration = Duration::from_secs(1);
/// Rate-table entries idle longer than this are pruned.
const RATE_ENTRY_TTL: Duration = Duration::from_secs(30);

/// White peers gossiped to each announce target per interval.
const GOSSIP_FANOUT: usize = 8;

// ── Listener ─────────────────────────────────────────────────────────────────

/// Receive peer announcements and populate the gray list.
///
/// Runs until the shutdown channel fires.
pub async fn listener_loop(
    directory: PeerDirectory,
    exchange_port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", exchange_port))
        .await
        .context("failed to bind exchange socket")?;
    tracing::info!(port = exchange_port, "peer exchange listener starting");

    let rate_table: DashMap<IpAddr, (Instant, u32)> = DashMap::new();
    let mut prune_interval = tokio::time::interval(RATE_ENTRY_TTL);
    let mut buf = vec![0u8; 2048];

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("exchange listener shutting down");
                return Ok(());
            }

            _ = prune_interval.tick() => {
                rate_table.retain(|_, (seen, _)| seen.elapsed() < RATE_ENTRY_TTL);
            }

            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "recv_from failed");
                        continue;
                    }
                };
                if !admit(&rate_table, from) {
                    tracing::trace!(from = %from, "rate-limited announcement");
                    continue;
                }
                handle_datagram(&directory, &buf[..len], from);
            }
        }
    }
}

/// Sliding-window admission per source IP.
fn admit(rate_table: &DashMap<IpAddr, (Instant, u32)>, from: SocketAddr) -> bool {
    let mut entry = rate_table.entry(from.ip()).or_insert((Instant::now(), 0));
    let (window_start, count) = *entry;
    if window_start.elapsed() > RATE_WINDOW {
        *entry = (Instant::now(), 1);
        return true;
    }
    if count >= RATE_LIMIT_PER_WINDOW {
        return false;
    }
    *entry = (window_start, count + 1);
    true
}

fn handle_datagram(directory: &PeerDirectory, datagram: &[u8], from: SocketAddr) {
    let Some(announcement) = PeerAnnouncement::parse(datagram) else {
        tracing::trace!(from = %from, "dropped unparseable announcement");
        return;
    };
    let address = match announcement.address() {
        Ok(a) => a,
        Err(e) => {
            tracing::trace!(from = %from, error = %e, "dropped announcement");
            return;
        }
    };
    let port = announcement.port;
    if port == 0 {
        tracing::trace!(from = %from, "dropped announcement with port 0");
        return;
    }

    let source = if announcement.is_self_reported() {
        PeerSource::SelfReported
    } else {
        PeerSource::Gossiped
    };
    tracing::debug!(peer = address, port, from = %from, "peer announced");
    directory.upsert(address, port, source);
}

// ── Announcer ────────────────────────────────────────────────────────────────

/// Periodically announce ourselves (when we have a public address) and
/// gossip a slice of our white list to every configured target.
///
/// Runs until the shutdown channel fires.
pub async fn announce_loop(
    directory: PeerDirectory,
    public_address: Option<String>,
    p2p_port: u16,
    targets: Vec<HostPort>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    if targets.is_empty() {
        // Nothing to do, but stay alive — the daemon treats any task
        // exiting as a fault.
        tracing::debug!("no announce targets configured, announcer idle");
        let _ = shutdown.recv().await;
        return Ok(());
    }

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to bind announce socket")?;
    let mut interval = tokio::time::interval(Duration::from_secs(ANNOUNCE_INTERVAL_SECS));

    tracing::info!(
        targets = targets.len(),
        interval_secs = ANNOUNCE_INTERVAL_SECS,
        "peer announcer starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("announcer shutting down");
                return Ok(());
            }

            _ = interval.tick() => {
                announce_once(&socket, &directory, public_address.as_deref(), p2p_port, &targets).await;
            }
        }
    }
}

async fn announce_once(
    socket: &UdpSocket,
    directory: &PeerDirectory,
    public_address: Option<&str>,
    p2p_port: u16,
    targets: &[HostPort],
) {
    let mut datagrams: Vec<PeerAnnouncement> = Vec::new();

    if let Some(address) = public_address {
        match PeerAnnouncement::new(address, p2p_port, SOURCE_SELF) {
            Ok(ann) => datagrams.push(ann),
            Err(e) => tracing::warn!(error = %e, "own address not announceable"),
        }
    }

    let white = directory.snapshot(&SnapshotFilter::lists(&[PeerList::White]));
    for record in white.iter().take(GOSSIP_FANOUT) {
        match PeerAnnouncement::new(&record.address, record.port, SOURCE_GOSSIPED) {
            Ok(ann) => datagrams.push(ann),
            Err(e) => tracing::trace!(error = %e, "skipping ungossipable peer"),
        }
    }
    if datagrams.is_empty() {
        return;
    }

    for target in targets {
        for ann in &datagrams {
            match socket
                .send_to(ann.as_bytes(), (target.host.as_str(), target.port))
                .await
            {
                Ok(n) => tracing::trace!(bytes = n, target = %target, "announcement sent"),
                Err(e) => tracing::warn!(error = %e, target = %target, "announcement send failed"),
            }
        }
    }
}

// ── Hello listener ───────────────────────────────────────────────────────────

/// Longest hello line we will read.
const MAX_HELLO_LINE: u64 = 4096;
/// A peer gets this long to send its hello line.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Answer incoming hello handshakes on the p2p port.
///
/// This is the surface other daemons' bootstrap dials verify against: one
/// JSON line in, one JSON line out, close.
pub async fn hello_listener(
    directory: PeerDirectory,
    p2p_port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", p2p_port))
        .await
        .context("failed to bind p2p hello listener")?;
    tracing::info!(port = p2p_port, "p2p hello listener starting");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("hello listener shutting down");
                return Ok(());
            }

            accepted = listener.accept() => {
                let (stream, from) = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let directory = directory.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        tokio::time::timeout(HELLO_TIMEOUT, answer_hello(stream, &directory)).await
                            .unwrap_or_else(|_| Err(anyhow::anyhow!("hello timed out")))
                    {
                        tracing::debug!(from = %from, error = %e, "hello exchange failed");
                    }
                });
            }
        }
    }
}

async fn answer_hello(stream: tokio::net::TcpStream, directory: &PeerDirectory) -> Result<()> {
    let mut stream = BufReader::new(stream);

    let mut line = String::new();
    (&mut stream)
        .take(MAX_HELLO_LINE)
        .read_line(&mut line)
        .await?;
    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let version = request
        .get("waypoint")
        .and_then(|v| v.as_u64())
        .context("hello missing version")?;
    if version != u64::from(WIRE_VERSION) {
        anyhow::bail!("unsupported wire version {version}");
    }

    let (white, gray) = directory.counts();
    let mut reply = serde_json::to_vec(&serde_json::json!({
        "waypoint": WIRE_VERSION,
        "peers": (white + gray) as u64,
    }))?;
    reply.push(b'\n');
    stream.get_mut().write_all(&reply).await?;
    Ok(())
}

// ── Stats ────────────────────────────────────────────────────────────────────

/// Periodic directory size log line.
///
/// Runs forever — cancel by dropping the task handle.
pub async fn stats_loop(directory: PeerDirectory) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let (white, gray) = directory.counts();
        tracing::info!(white, gray, "peer directory");
    }
}
