//! waypoint-ctl — command-line interface for the Waypoint daemon.

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 18089;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    uptime_secs: u64,
    white_peers: usize,
    gray_peers: usize,
    proxied_zones: Vec<String>,
    bootstrap: BootstrapInfo,
}

#[derive(Deserialize)]
struct BootstrapInfo {
    state: String,
    peer: Option<String>,
    cycles: u64,
}

#[derive(Deserialize)]
struct PublicNodesResponse {
    white: Vec<PublicNode>,
    gray: Vec<PublicNode>,
}

#[derive(Deserialize)]
struct PublicNode {
    host: String,
    port: u16,
    last_seen: u64,
}

#[derive(Deserialize)]
struct PeerListResponse {
    white_list: Vec<PeerEntry>,
    gray_list: Vec<PeerEntry>,
}

#[derive(Deserialize)]
struct PeerEntry {
    host: String,
    port: u16,
    zone: String,
    source: String,
    failures: u32,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to waypointd at {} — is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

/// POST with an optional JSON body. No body at all exercises the daemon's
/// legacy `public_only` default.
async fn post_json<T: for<'de> Deserialize<'de>>(
    url: &str,
    body: Option<serde_json::Value>,
) -> Result<T> {
    let client = reqwest::Client::new();
    let request = match body {
        Some(body) => client.post(url).json(&body),
        None => client.post(url),
    };
    request
        .send()
        .await
        .with_context(|| format!("failed to connect to waypointd at {} — is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Waypoint Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime          : {}s", resp.uptime_secs);
    println!("  White peers     : {}", resp.white_peers);
    println!("  Gray peers      : {}", resp.gray_peers);
    if resp.proxied_zones.is_empty() {
        println!("  Proxied zones   : none (clearnet only)");
    } else {
        println!("  Proxied zones   : {}", resp.proxied_zones.join(", "));
    }
    println!("  Bootstrap state : {}", resp.bootstrap.state);
    if let Some(peer) = &resp.bootstrap.peer {
        println!("  Bootstrap peer  : {}", peer);
    }
    println!("  Bootstrap cycles: {}", resp.bootstrap.cycles);

    Ok(())
}

async fn cmd_public_nodes(port: u16, all: bool) -> Result<()> {
    let body = all.then(|| serde_json::json!({ "public_only": false }));
    let resp: PublicNodesResponse =
        post_json(&format!("{}/get_public_nodes", base_url(port)), body).await?;

    println!("═══════════════════════════════════════");
    println!(
        "  Known Nodes ({} white, {} gray){}",
        resp.white.len(),
        resp.gray.len(),
        if all { "" } else { " — clearnet only" }
    );
    println!("═══════════════════════════════════════");

    for (label, nodes) in [("white", &resp.white), ("gray", &resp.gray)] {
        for n in nodes {
            println!(
                "  [{}] {}:{} (seen {}s)",
                label, n.host, n.port, n.last_seen
            );
        }
    }
    if resp.white.is_empty() && resp.gray.is_empty() {
        println!("  No nodes known yet.");
    }

    Ok(())
}

async fn cmd_peers(port: u16, all: bool) -> Result<()> {
    let body = all.then(|| serde_json::json!({ "public_only": false }));
    let resp: PeerListResponse =
        post_json(&format!("{}/get_peer_list", base_url(port)), body).await?;

    println!("═══════════════════════════════════════");
    println!(
        "  Peer List ({} white, {} gray)",
        resp.white_list.len(),
        resp.gray_list.len()
    );
    println!("═══════════════════════════════════════");

    for (label, entries) in [("white", &resp.white_list), ("gray", &resp.gray_list)] {
        for p in entries {
            println!("  ┌─ {}:{}", p.host, p.port);
            println!("  │  list     : {}", label);
            println!("  │  zone     : {}", p.zone);
            println!("  │  source   : {}", p.source);
            println!("  └─ failures : {}", p.failures);
        }
    }
    if resp.white_list.is_empty() && resp.gray_list.is_empty() {
        println!("  No peers known yet.");
    }

    Ok(())
}

fn print_usage() {
    println!("Usage: waypoint-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                 Show daemon status and bootstrap state");
    println!("  public-nodes [--all]   List bootstrap-eligible nodes (--all includes anonymity zones)");
    println!("  peers [--all]          Full peer list with zone diagnostics");
    println!();
    println!("Options:");
    println!("  --port <port>   API endpoint port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd_status(port).await,
        ["public-nodes"] => cmd_public_nodes(port, false).await,
        ["public-nodes", "--all"] => cmd_public_nodes(port, true).await,
        ["peers"] => cmd_peers(port, false).await,
        ["peers", "--all"] => cmd_peers(port, true).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
