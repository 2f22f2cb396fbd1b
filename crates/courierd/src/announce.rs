//! System announcements.
//!
//! Systems periodically send a small JSON document describing themselves
//! to the link port. Receiving one marks the sender directly reachable; a
//! separate expiry task forgets learned systems that fall silent.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use courier_core::SystemId;
use courier_services::{SystemInfo, SystemTable};

/// How often our own announcement goes out.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub name: String,
    pub id: u16,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub acoustic_reach: Vec<String>,
}

impl Announcement {
    pub fn into_info(self) -> SystemInfo {
        SystemInfo {
            id: SystemId(self.id),
            name: self.name,
            services: self.services,
            acoustic_reach: self.acoustic_reach,
        }
    }
}

/// Parse a datagram as an announcement. Binary frames never start with '{'.
pub fn parse(datagram: &[u8]) -> Option<Announcement> {
    if datagram.first() != Some(&b'{') {
        return None;
    }
    match serde_json::from_slice(datagram) {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::trace!(error = %e, "malformed announcement");
            None
        }
    }
}

/// Send our announcement to every system with a known address.
///
/// Runs forever; cancel by dropping the task handle.
pub async fn announce_loop(
    socket: Arc<UdpSocket>,
    systems: SystemTable,
    own: Announcement,
) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(&own)?;
    let mut interval = tokio::time::interval(ANNOUNCE_INTERVAL);

    loop {
        interval.tick().await;
        for entry in systems.snapshot() {
            let Some(addr) = entry.addr else { continue };
            if let Err(e) = socket.send_to(&payload, addr).await {
                tracing::debug!(system = %entry.info.name, error = %e, "announcement not sent");
            }
        }
    }
}

/// Drop learned systems that stopped announcing.
///
/// Runs forever; cancel by dropping the task handle.
pub async fn expiry_loop(systems: SystemTable) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        interval.tick().await;
        let expired = systems.expire();
        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), systems = ?expired, "expired learned systems");
        }
    }
}
