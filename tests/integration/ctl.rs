//! waypoint-ctl: verify API shape and CLI output.

use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::*;

fn ctl(ports: PortBlock, args: &[&str]) -> Result<String> {
    let output = Command::new(ctl_bin())
        .arg("--port")
        .arg(ports.api.to_string())
        .args(args)
        .output()
        .context("run waypoint-ctl")?;
    if !output.status.success() {
        bail!(
            "waypoint-ctl {:?} failed:\n{}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[test]
fn test_ctl_status_and_peers() {
    if !binaries_available() || !ctl_bin().exists() {
        eprintln!("SKIP: binaries not built — run cargo build first");
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();
    let ports = PortBlock::at(24190);
    let daemon = spawn_daemon("ctl", ports, &[]);

    let result = (|| -> Result<()> {
        wait_for_api(ports, 20)?;
        announce_peer(ports, "93.184.216.34", 18080, false);
        announce_peer(ports, "expyuzz4wqqyqhjn.onion", 18080, false);
        wait_for_status(ports, 10, |s| s["gray_peers"] == 2)?;

        let out = ctl(ports, &["status"])?;
        assert!(out.contains("Waypoint Daemon Status"), "status header missing: {out}");
        assert!(out.contains("Gray peers"), "missing gray line: {out}");

        // default command (no args) should also show status
        let default_out = ctl(ports, &[])?;
        assert!(default_out.contains("Waypoint Daemon Status"), "default cmd not status");

        // public-nodes hides the onion entry unless --all
        let filtered = ctl(ports, &["public-nodes"])?;
        assert!(filtered.contains("93.184.216.34"), "clearnet entry missing: {filtered}");
        assert!(!filtered.contains(".onion"), "onion leaked into default view: {filtered}");

        let all = ctl(ports, &["public-nodes", "--all"])?;
        assert!(all.contains(".onion"), "onion missing from --all view: {all}");

        // peers shows zone diagnostics
        let peers = ctl(ports, &["peers", "--all"])?;
        assert!(peers.contains("zone     : tor"), "missing tor zone: {peers}");

        Ok(())
    })();

    drop(daemon);
    result.unwrap();
}
