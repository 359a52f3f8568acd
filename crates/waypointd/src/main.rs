//! waypointd — zone-aware peer directory and bootstrap daemon.

use std::sync::Arc;

use anyhow::{Context, Result};

use waypoint_core::config::{BootstrapMode, WaypointConfig};
use waypoint_core::HostPort;
use waypoint_services::{BootstrapStatus, PeerDirectory};

mod bootstrap;
mod dial;
mod exchange;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load config
    if let Err(e) = WaypointConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = WaypointConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        WaypointConfig::default()
    });

    // Proxy bindings are built exactly once. A broken binding table is a
    // configuration error the operator has to fix — refuse to start.
    let bindings = Arc::new(
        config
            .bootstrap
            .proxy_bindings()
            .context("invalid tx_proxy configuration")?,
    );
    let bootstrap_proxy: Option<HostPort> = match config.bootstrap.daemon_proxy.trim() {
        "" => None,
        raw => Some(
            raw.parse()
                .context("invalid bootstrap daemon_proxy endpoint")?,
        ),
    };
    if let BootstrapMode::Fixed(address) = config.bootstrap.mode() {
        address
            .parse::<HostPort>()
            .context("invalid bootstrap daemon_address")?;
    }
    if !bindings.is_empty() {
        tracing::info!(
            zones = ?bindings.bound_zones().iter().map(|z| z.to_string()).collect::<Vec<_>>(),
            "outbound proxies bound"
        );
    }

    // Peer directory
    let directory = PeerDirectory::new(
        config.directory.white_capacity,
        config.directory.gray_capacity,
        config.directory.failure_threshold,
    );
    let persist_path = if config.directory.persist_path.as_os_str().is_empty() {
        None
    } else {
        Some(config.directory.persist_path.clone())
    };
    if let Some(path) = &persist_path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create data directory");
            }
        }
        directory.load(path);
    }

    let announce_targets: Vec<HostPort> = config
        .network
        .announce_targets
        .iter()
        .map(|t| t.parse().context("invalid announce target"))
        .collect::<Result<_>>()?;
    let public_address = match config.network.public_address.trim() {
        "" => None,
        addr => Some(addr.to_string()),
    };

    let bootstrap_status = BootstrapStatus::new();

    tracing::info!(
        p2p_port = config.network.p2p_port,
        exchange_port = config.network.exchange_port,
        api_port = config.network.api_port,
        "waypointd starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let exchange_task = tokio::spawn(exchange::listener_loop(
        directory.clone(),
        config.network.exchange_port,
        shutdown_tx.subscribe(),
    ));

    let announce_task = tokio::spawn(exchange::announce_loop(
        directory.clone(),
        public_address,
        config.network.p2p_port,
        announce_targets,
        shutdown_tx.subscribe(),
    ));

    let hello_task = tokio::spawn(exchange::hello_listener(
        directory.clone(),
        config.network.p2p_port,
        shutdown_tx.subscribe(),
    ));

    let stats_task = tokio::spawn(exchange::stats_loop(directory.clone()));

    let bootstrap_task = tokio::spawn(
        bootstrap::BootstrapDriver::new(
            directory.clone(),
            bindings.clone(),
            &config.bootstrap,
            bootstrap_proxy,
            bootstrap_status.clone(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let api_task = {
        let state = waypoint_api::ApiState {
            directory: directory.clone(),
            bindings: bindings.clone(),
            bootstrap_status: bootstrap_status.clone(),
            started: std::time::Instant::now(),
        };
        let api_port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = waypoint_api::serve(state, api_port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = exchange_task       => tracing::error!("exchange listener exited: {:?}", r),
        r = announce_task       => tracing::error!("announcer exited: {:?}", r),
        r = hello_task          => tracing::error!("hello listener exited: {:?}", r),
        r = stats_task          => tracing::error!("stats printer exited: {:?}", r),
        r = api_task            => tracing::error!("API server exited: {:?}", r),
        r = bootstrap_task      => {
            if let Ok(Err(e)) = r {
                tracing::error!(error = %e, "bootstrap driver failed");
            }
            // A finished bootstrap driver is normal; keep serving.
            let mut shutdown_rx = shutdown_tx.subscribe();
            let _ = shutdown_rx.recv().await;
            tracing::info!("shutting down");
        }
    }

    if let Some(path) = &persist_path {
        directory.save(path);
        tracing::info!(path = %path.display(), "peer lists persisted");
    }

    Ok(())
}
