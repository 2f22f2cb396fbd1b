//! courierd: multi-channel command delivery daemon.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use courier_core::config::CourierConfig;
use courier_core::SystemId;
use courier_services::{
    BearerDriver, ChannelRegistry, ChannelSelector, ControlLoops, DirectDriver, RelayDriver,
    SystemInfo, SystemOracle, SystemTable, TransmissionDispatcher,
};

mod announce;
mod link;
mod spool;

use announce::Announcement;
use link::{Outbound, SendWorker, UdpDirectSender, UdpRelaySender};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CourierConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CourierConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CourierConfig::default()
    });
    let local_id = SystemId(config.identity.system_id);
    tracing::info!(name = %config.identity.name, id = %local_id, "courierd starting");

    // Known systems
    let systems = SystemTable::new(Duration::from_secs(config.network.system_ttl_secs));
    for system in &config.systems {
        let addr = system
            .addr
            .as_deref()
            .map(|a| a.parse::<SocketAddr>())
            .transpose()
            .with_context(|| format!("invalid address for system {}", system.name))?;
        let mut info = SystemInfo::new(&system.name, system.id);
        info.services = system.services.clone();
        info.acoustic_reach = system.acoustic_reach.clone();
        systems.insert(info, addr);
    }
    systems.set_satellite_available(config.satellite.enabled);
    tracing::info!(count = systems.len(), "system table loaded");
    let oracle: Arc<dyn SystemOracle> = Arc::new(systems.clone());

    // Link socket
    let bind = format!("{}:{}", config.network.bind_addr, config.network.port);
    let socket = Arc::new(
        UdpSocket::bind(&bind)
            .await
            .with_context(|| format!("failed to bind link socket on {bind}"))?,
    );
    tracing::info!(addr = %socket.local_addr()?, "link socket bound");

    // Outbound queue
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(config.network.queue_depth.max(1));

    // Channels and dispatcher
    let registry = Arc::new(
        ChannelRegistry::new(config.channels.clone(), oracle.clone())
            .with_relay_service(&config.delivery.relay_service),
    );
    let selector = ChannelSelector::new(registry, config.delivery.default_channels.clone());

    let mut dispatcher = TransmissionDispatcher::new(local_id, selector)
        .with_default_timeout(Duration::from_millis(config.delivery.timeout_millis))
        .with_driver(Arc::new(DirectDriver::new(Arc::new(UdpDirectSender::new(
            systems.clone(),
            out_tx.clone(),
        )))))
        .with_driver(Arc::new(
            RelayDriver::new(
                Arc::new(UdpRelaySender::new(systems.clone(), out_tx.clone())),
                oracle.clone(),
            )
            .with_acoustic_timeout(Duration::from_secs(config.delivery.acoustic_timeout_secs)),
        ));
    if config.satellite.enabled {
        let spool = spool::SpoolSender::new(&config.satellite.spool_dir)?;
        tracing::info!(dir = %spool.dir().display(), "satellite spool ready");
        dispatcher = dispatcher.with_driver(Arc::new(BearerDriver::new(Arc::new(spool))));
    }
    let dispatcher = Arc::new(dispatcher);
    let control = Arc::new(ControlLoops::new(dispatcher.clone()));

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

    let send_worker_task = tokio::spawn(
        SendWorker::new(socket.clone(), out_rx, shutdown_tx.subscribe()).run(),
    );

    let receive_task = tokio::spawn(link::receive_loop(
        socket.clone(),
        systems.clone(),
        config.identity.name.clone(),
    ));

    let expiry_task = tokio::spawn(announce::expiry_loop(systems.clone()));

    let announce_task = tokio::spawn(announce::announce_loop(
        socket.clone(),
        systems.clone(),
        Announcement {
            name: config.identity.name.clone(),
            id: config.identity.system_id,
            services: Vec::new(),
            acoustic_reach: Vec::new(),
        },
    ));

    let api_task = {
        let state = courier_api::ApiState {
            name: config.identity.name.clone(),
            system_id: local_id,
            dispatcher: dispatcher.clone(),
            systems: systems.clone(),
            control: control.clone(),
            started_at: Instant::now(),
        };
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = courier_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()   => tracing::info!("shutting down"),
        r = send_worker_task     => tracing::error!("send worker exited: {:?}", r),
        r = receive_task         => tracing::error!("receive loop exited: {:?}", r),
        r = expiry_task          => tracing::error!("expiry task exited: {:?}", r),
        r = announce_task        => tracing::error!("announce task exited: {:?}", r),
        r = api_task             => tracing::error!("API task exited: {:?}", r),
    }

    control.stop_all();
    Ok(())
}
