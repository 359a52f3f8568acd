//! RPC contract tests: the `public_only` default and zone filtering.

use anyhow::{Context, Result};

use crate::*;

const I2P_ADDR: &str = "ukeu3k5oycgaauneqgtnvselmt4yemvoilkln7jpvamvfx7dnkdq.b32.i2p";

fn seed_mixed_directory(ports: PortBlock) -> Result<()> {
    announce_peer(ports, "93.184.216.34", 18080, false);
    announce_peer(ports, I2P_ADDR, 18080, false);
    // wait until both announcements are visible
    wait_for_status(ports, 10, |s| s["gray_peers"] == 2)?;
    Ok(())
}

/// Legacy clients send no `public_only` at all. Their responses must be
/// byte-identical to an explicit `public_only = true`.
#[test]
fn test_default_equals_explicit_public_only() {
    if !binaries_available() {
        eprintln!("SKIP: waypointd not built — run cargo build first");
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();
    let ports = PortBlock::at(24110);
    let daemon = spawn_daemon("rpc-default", ports, &[]);

    let result = (|| -> Result<()> {
        wait_for_api(ports, 20)?;
        seed_mixed_directory(ports)?;

        for path in ["/get_public_nodes", "/get_peer_list"] {
            let default_body = api_post(ports, path, None)?.text()?;
            let explicit_body = api_post(
                ports,
                path,
                Some(serde_json::json!({ "public_only": true })),
            )?
            .text()?;
            assert_eq!(
                default_body, explicit_body,
                "{path}: default and explicit public_only=true must agree"
            );
        }
        Ok(())
    })();

    drop(daemon);
    result.unwrap();
}

/// Everything in a default response must classify as clearnet; the i2p
/// entry only appears once the filter is lifted.
#[test]
fn test_public_only_filter_hides_anonymity_zones() {
    if !binaries_available() {
        eprintln!("SKIP: waypointd not built — run cargo build first");
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();
    let ports = PortBlock::at(24120);
    let daemon = spawn_daemon("rpc-filter", ports, &[]);

    let result = (|| -> Result<()> {
        wait_for_api(ports, 20)?;
        seed_mixed_directory(ports)?;

        let filtered: serde_json::Value =
            api_post(ports, "/get_public_nodes", None)?.json()?;
        let gray = filtered["gray"].as_array().context("no gray array")?;
        assert_eq!(gray.len(), 1, "only the clearnet entry: {filtered}");
        assert_eq!(gray[0]["host"], "93.184.216.34");

        let unfiltered: serde_json::Value = api_post(
            ports,
            "/get_peer_list",
            Some(serde_json::json!({ "public_only": false })),
        )?
        .json()?;
        let gray = unfiltered["gray_list"]
            .as_array()
            .context("no gray_list array")?;
        assert_eq!(gray.len(), 2, "both zones visible: {unfiltered}");
        let i2p = gray
            .iter()
            .find(|e| e["host"] == I2P_ADDR)
            .context("i2p entry missing")?;
        assert_eq!(i2p["zone"], "i2p");

        Ok(())
    })();

    drop(daemon);
    result.unwrap();
}

/// A `public_only` that is not a boolean is a malformed request: client
/// error, and the directory is untouched.
#[test]
fn test_malformed_public_only_is_rejected() {
    if !binaries_available() {
        eprintln!("SKIP: waypointd not built — run cargo build first");
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();
    let ports = PortBlock::at(24130);
    let daemon = spawn_daemon("rpc-malformed", ports, &[]);

    let result = (|| -> Result<()> {
        wait_for_api(ports, 20)?;
        announce_peer(ports, "93.184.216.34", 18080, false);
        wait_for_status(ports, 10, |s| s["gray_peers"] == 1)?;

        let response = api_post(
            ports,
            "/get_public_nodes",
            Some(serde_json::json!({ "public_only": "yes please" })),
        )?;
        assert!(
            response.status().is_client_error(),
            "expected 4xx, got {}",
            response.status()
        );

        // State untouched, valid requests still served.
        let ok: serde_json::Value = api_post(ports, "/get_public_nodes", None)?.json()?;
        assert_eq!(ok["gray"].as_array().context("gray")?.len(), 1);
        Ok(())
    })();

    drop(daemon);
    result.unwrap();
}
