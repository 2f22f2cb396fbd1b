//! System oracle: what the dispatcher may ask about the outside world.
//!
//! The dispatcher never probes the network itself. It asks a
//! [`SystemOracle`] whether a destination is reachable, which systems can
//! relay, and whether the satellite service is up. [`SystemTable`] is the
//! in-memory implementation fed by configuration and system announcements.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_core::SystemId;
use dashmap::DashMap;
use serde::Serialize;

/// Identity and advertised capabilities of a system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub id: SystemId,
    pub name: String,
    /// Advertised services, e.g. "acoustic/operation".
    pub services: Vec<String>,
    /// Systems this one can reach over its acoustic modem.
    pub acoustic_reach: Vec<String>,
}

impl SystemInfo {
    pub fn new(name: &str, id: u16) -> Self {
        Self {
            id: SystemId(id),
            name: name.to_string(),
            services: Vec::new(),
            acoustic_reach: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.services.push(service.to_string());
        self
    }

    pub fn with_acoustic_reach(mut self, name: &str) -> Self {
        self.acoustic_reach.push(name.to_string());
        self
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }

    pub fn reaches_acoustically(&self, name: &str) -> bool {
        self.acoustic_reach.iter().any(|n| n == name)
    }
}

/// Read-only questions the selector and dispatcher ask about systems.
///
/// Implementations must be cheap and safe to call from many in-flight
/// deliveries at once.
pub trait SystemOracle: Send + Sync {
    /// Look a destination up by name.
    fn resolve(&self, name: &str) -> Option<SystemInfo>;

    /// Is there a live direct link to this system right now?
    fn is_reachable(&self, system: &SystemInfo) -> bool;

    /// Directly reachable systems advertising `service`. The caller owns the list.
    fn relay_candidates(&self, service: &str) -> Vec<SystemInfo>;

    /// Can `relay` forward acoustically to `destination`?
    fn relay_can_reach(&self, relay: &SystemInfo, destination: &SystemInfo) -> bool {
        relay.reaches_acoustically(&destination.name)
    }

    /// Does the satellite service report itself available?
    fn satellite_available(&self) -> bool;
}

/// One row of the system table.
#[derive(Debug, Clone)]
pub struct SystemEntry {
    pub info: SystemInfo,
    /// Where to send datagrams, once known.
    pub addr: Option<SocketAddr>,
    /// Last time any announcement arrived. None = never heard.
    pub last_seen: Option<Instant>,
    /// Learned from an announcement rather than configured.
    pub learned: bool,
}

/// In-memory system registry keyed by name.
///
/// Shared between the announcement listener, the expiry task, the API and
/// every in-flight delivery.
#[derive(Clone)]
pub struct SystemTable {
    systems: Arc<DashMap<String, SystemEntry>>,
    ttl: Duration,
    satellite: Arc<AtomicBool>,
}

impl SystemTable {
    /// Systems silent for longer than `ttl` are no longer directly reachable.
    pub fn new(ttl: Duration) -> Self {
        Self {
            systems: Arc::new(DashMap::new()),
            ttl,
            satellite: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add a configured system. Liveness is kept if it was already heard from.
    pub fn insert(&self, info: SystemInfo, addr: Option<SocketAddr>) {
        let name = info.name.clone();
        let mut entry = self.systems.entry(name).or_insert_with(|| SystemEntry {
            info: info.clone(),
            addr,
            last_seen: None,
            learned: false,
        });
        entry.info = info;
        if addr.is_some() {
            entry.addr = addr;
        }
        entry.learned = false;
    }

    /// Record an announcement: upsert the system and mark it seen now.
    pub fn observe(&self, info: SystemInfo, addr: SocketAddr) {
        let now = Instant::now();
        self.systems
            .entry(info.name.clone())
            .and_modify(|e| {
                e.info = info.clone();
                e.addr = Some(addr);
                e.last_seen = Some(now);
            })
            .or_insert_with(|| SystemEntry {
                info,
                addr: Some(addr),
                last_seen: Some(now),
                learned: true,
            });
    }

    /// Mark a known system as seen now. Returns false if unknown.
    pub fn touch(&self, name: &str) -> bool {
        match self.systems.get_mut(name) {
            Some(mut e) => {
                e.last_seen = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Forget liveness without forgetting the system.
    pub fn mark_lost(&self, name: &str) {
        if let Some(mut e) = self.systems.get_mut(name) {
            e.last_seen = None;
        }
    }

    pub fn set_satellite_available(&self, available: bool) {
        self.satellite.store(available, Ordering::Relaxed);
    }

    pub fn get(&self, name: &str) -> Option<SystemEntry> {
        self.systems.get(name).map(|e| e.clone())
    }

    pub fn addr_of(&self, name: &str) -> Option<SocketAddr> {
        self.systems.get(name).and_then(|e| e.addr)
    }

    /// Snapshot of every row, sorted by name.
    pub fn snapshot(&self) -> Vec<SystemEntry> {
        let mut rows: Vec<SystemEntry> = self.systems.iter().map(|e| e.value().clone()).collect();
        rows.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        rows
    }

    /// Drop learned systems silent for longer than the TTL. Returns their names.
    pub fn expire(&self) -> Vec<String> {
        let stale: Vec<String> = self
            .systems
            .iter()
            .filter(|e| e.learned && !self.is_live(e.value()))
            .map(|e| e.key().clone())
            .collect();
        for name in &stale {
            self.systems.remove(name);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    fn is_live(&self, entry: &SystemEntry) -> bool {
        entry
            .last_seen
            .is_some_and(|seen| seen.elapsed() <= self.ttl)
    }
}

impl SystemOracle for SystemTable {
    fn resolve(&self, name: &str) -> Option<SystemInfo> {
        self.systems.get(name).map(|e| e.info.clone())
    }

    fn is_reachable(&self, system: &SystemInfo) -> bool {
        self.systems
            .get(&system.name)
            .is_some_and(|e| self.is_live(e.value()))
    }

    fn relay_candidates(&self, service: &str) -> Vec<SystemInfo> {
        self.systems
            .iter()
            .filter(|e| e.info.has_service(service) && self.is_live(e.value()))
            .map(|e| e.info.clone())
            .collect()
    }

    fn satellite_available(&self) -> bool {
        self.satellite.load(Ordering::Relaxed)
    }
}
