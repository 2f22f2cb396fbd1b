//! Config file loading feeding a system table the way the daemon does.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use courier_core::config::CourierConfig;
use courier_core::ChannelKind;
use courier_services::{DeliveryOutcome, DeliveryRequest, SystemOracle};

use crate::*;

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("courier-it-{}-{name}", std::process::id()))
}

fn table_from(config: &CourierConfig) -> Result<SystemTable> {
    let table = SystemTable::new(Duration::from_secs(config.network.system_ttl_secs));
    for system in &config.systems {
        let addr = system
            .addr
            .as_deref()
            .map(|a| a.parse::<SocketAddr>())
            .transpose()
            .with_context(|| format!("invalid address for {}", system.name))?;
        let mut info = SystemInfo::new(&system.name, system.id);
        info.services = system.services.clone();
        info.acoustic_reach = system.acoustic_reach.clone();
        table.insert(info, addr);
    }
    table.set_satellite_available(config.satellite.enabled);
    Ok(table)
}

#[test]
fn config_file_populates_systems() -> Result<()> {
    let path = temp_file("systems.toml");
    std::fs::write(
        &path,
        r#"
[identity]
system_id = 16386
name = "ops"

[satellite]
enabled = true
spool_dir = "/tmp/courier-spool"

[[systems]]
name = "auv-1"
id = 21

[[systems]]
name = "buoy"
id = 48
addr = "10.0.0.48:6002"
services = ["acoustic/operation"]
acoustic_reach = ["auv-1"]
"#,
    )?;

    let config = CourierConfig::load_from(&path)?;
    std::fs::remove_file(&path)?;

    assert_eq!(config.identity.name, "ops");
    assert_eq!(config.network.port, 6002);
    assert_eq!(config.channels[0].kind, ChannelKind::Wifi);

    let table = table_from(&config)?;
    assert_eq!(table.len(), 2);
    assert!(table.satellite_available());
    assert_eq!(table.addr_of("buoy"), Some("10.0.0.48:6002".parse()?));
    let auv = table.resolve("auv-1").context("auv-1 configured")?;
    assert!(!table.is_reachable(&auv));
    Ok(())
}

#[test]
fn missing_file_means_defaults() -> Result<()> {
    let config = CourierConfig::load_from(&temp_file("does-not-exist.toml"))?;
    assert_eq!(config.identity.system_id, 0x4001);
    assert!(config.systems.is_empty());
    Ok(())
}

#[test]
fn bad_system_address_is_reported() {
    let mut config = CourierConfig::default();
    config.systems.push(courier_core::config::SystemConfig {
        name: "buoy".into(),
        id: 48,
        addr: Some("not-an-addr".into()),
        services: vec![],
        acoustic_reach: vec![],
    });
    let err = table_from(&config).err().expect("address rejected");
    assert!(err.to_string().contains("buoy"));
}

#[test]
fn configured_delivery_timeout_bounds_silent_deliveries() {
    let mut config = CourierConfig::default();
    config.apply_overrides(|k| (k == "COURIER_DELIVERY__TIMEOUT_MILLIS").then(|| "40".to_string()));

    let h = Harness::configured(|d| {
        d.with_default_timeout(Duration::from_millis(config.delivery.timeout_millis))
    });
    h.wifi_mode(WifiMode::Silent);
    h.systems.touch("auv-1");

    let started = Instant::now();
    let handle = h.dispatcher.dispatch(DeliveryRequest::new(payload(4), "auv-1"));
    assert_eq!(h.wifi_sent(), 1);
    assert_eq!(handle.get(), DeliveryOutcome::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
}
