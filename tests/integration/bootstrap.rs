//! Auto-bootstrap tests: two real daemons, one bootstraps from the other.

use anyhow::{Context, Result};

use crate::*;

/// Daemon A in auto mode learns about daemon B via an exchange datagram,
/// dials it, promotes it to white, and reports connected. The operator log
/// lines (`Auto bootstrap`, `bootstrapping from`) must appear.
#[test]
fn test_auto_bootstrap_connects_and_promotes() {
    if !binaries_available() {
        eprintln!("SKIP: waypointd not built — run cargo build first");
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();
    let ports_a = PortBlock::at(24140);
    let ports_b = PortBlock::at(24150);

    let daemon_b = spawn_daemon("boot-b", ports_b, &[]);
    let daemon_a = spawn_daemon(
        "boot-a",
        ports_a,
        &[
            ("WAYPOINT_BOOTSTRAP__DAEMON_ADDRESS", "auto".to_string()),
            ("WAYPOINT_BOOTSTRAP__RETRY_INTERVAL_SECS", "1".to_string()),
            ("WAYPOINT_BOOTSTRAP__ATTEMPT_TIMEOUT_SECS", "5".to_string()),
        ],
    );

    let result = (|| -> Result<()> {
        wait_for_api(ports_b, 20)?;
        wait_for_api(ports_a, 20)?;

        // Tell A that B exists. The bootstrap driver may promote it
        // before we next poll, so accept either list.
        announce_peer(ports_a, "127.0.0.1", ports_b.p2p, false);
        wait_for_status(ports_a, 10, |s| {
            s["gray_peers"].as_u64() >= Some(1) || s["white_peers"].as_u64() >= Some(1)
        })?;

        // A's next bootstrap cycle should pick B up and connect.
        let status = wait_for_status(ports_a, 30, |s| s["bootstrap"]["state"] == "connected")?;
        let peer = status["bootstrap"]["peer"]
            .as_str()
            .context("no bootstrap peer")?;
        assert_eq!(peer, format!("127.0.0.1:{}", ports_b.p2p));

        // Success promotes gray → white.
        let nodes: serde_json::Value = api_post(ports_a, "/get_public_nodes", None)?.json()?;
        let white = nodes["white"].as_array().context("white")?;
        assert_eq!(white.len(), 1, "promoted peer should be white: {nodes}");
        assert_eq!(white[0]["host"], "127.0.0.1");

        // Operator log contract.
        let log = daemon_a.log();
        assert!(log.contains("Auto bootstrap"), "missing selector line:\n{log}");
        assert!(
            log.contains(&format!("bootstrapping from 127.0.0.1:{}", ports_b.p2p)),
            "missing attempt line:\n{log}"
        );
        Ok(())
    })();

    drop(daemon_a);
    drop(daemon_b);
    result.unwrap();
}

/// With no proxy configured, an i2p-only directory yields no candidates:
/// the daemon exhausts, keeps running, and never dials the i2p peer.
#[test]
fn test_auto_bootstrap_without_proxy_skips_i2p() {
    if !binaries_available() {
        eprintln!("SKIP: waypointd not built — run cargo build first");
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();
    let ports = PortBlock::at(24160);
    let daemon = spawn_daemon(
        "boot-i2p",
        ports,
        &[
            ("WAYPOINT_BOOTSTRAP__DAEMON_ADDRESS", "auto".to_string()),
            ("WAYPOINT_BOOTSTRAP__RETRY_INTERVAL_SECS", "1".to_string()),
        ],
    );

    let result = (|| -> Result<()> {
        wait_for_api(ports, 20)?;
        announce_peer(
            ports,
            "ukeu3k5oycgaauneqgtnvselmt4yemvoilkln7jpvamvfx7dnkdq.b32.i2p",
            18080,
            false,
        );
        wait_for_status(ports, 10, |s| s["gray_peers"] == 1)?;

        // At least one full cycle must have exhausted without dialing.
        let status = wait_for_status(ports, 20, |s| {
            s["bootstrap"]["state"] == "exhausted" && s["bootstrap"]["cycles"].as_u64() >= Some(1)
        })?;
        assert_eq!(status["bootstrap"]["peer"], serde_json::Value::Null);

        let log = daemon.log();
        assert!(
            !log.contains("bootstrapping from"),
            "an unreachable zone must never be dialed:\n{log}"
        );
        assert!(log.contains("no usable bootstrap peer"), "missing exhaustion line:\n{log}");
        Ok(())
    })();

    drop(daemon);
    result.unwrap();
}

/// Fixed bootstrap address: single candidate, dialed and promoted.
#[test]
fn test_fixed_bootstrap_address() {
    if !binaries_available() {
        eprintln!("SKIP: waypointd not built — run cargo build first");
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();
    let ports_a = PortBlock::at(24170);
    let ports_b = PortBlock::at(24180);

    let daemon_b = spawn_daemon("fixed-b", ports_b, &[]);
    let daemon_a = spawn_daemon(
        "fixed-a",
        ports_a,
        &[
            (
                "WAYPOINT_BOOTSTRAP__DAEMON_ADDRESS",
                format!("127.0.0.1:{}", ports_b.p2p),
            ),
            ("WAYPOINT_BOOTSTRAP__RETRY_INTERVAL_SECS", "1".to_string()),
        ],
    );

    let result = (|| -> Result<()> {
        wait_for_api(ports_b, 20)?;
        wait_for_api(ports_a, 20)?;

        let status = wait_for_status(ports_a, 30, |s| s["bootstrap"]["state"] == "connected")?;
        assert_eq!(
            status["bootstrap"]["peer"],
            format!("127.0.0.1:{}", ports_b.p2p)
        );

        let nodes: serde_json::Value = api_post(ports_a, "/get_public_nodes", None)?.json()?;
        assert_eq!(nodes["white"].as_array().context("white")?.len(), 1);
        Ok(())
    })();

    drop(daemon_a);
    drop(daemon_b);
    result.unwrap();
}
