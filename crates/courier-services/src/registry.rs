//! Channel registry: configured channels plus per-request activity checks.

use std::sync::{Arc, PoisonError, RwLock};

use courier_core::wire::ACOUSTIC_RELAY_SERVICE;
use courier_core::{ChannelDescriptor, ChannelKind};
use rand::Rng;

use crate::oracle::{SystemInfo, SystemOracle};
use crate::selector::discover_relay;

/// How a channel would reach a destination right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Inactive,
    /// Live direct link.
    Direct,
    /// Through an acoustic relay chosen for this request.
    Relay(SystemInfo),
    /// Through the satellite bearer.
    Bearer,
}

impl Route {
    pub fn is_active(&self) -> bool {
        !matches!(self, Route::Inactive)
    }
}

/// Ordered channel descriptors shared by every in-flight delivery.
///
/// Descriptors are read-mostly; `active` is never stored and is computed
/// per request through the injected oracle.
pub struct ChannelRegistry {
    channels: RwLock<Vec<ChannelDescriptor>>,
    oracle: Arc<dyn SystemOracle>,
    relay_service: String,
}

impl ChannelRegistry {
    pub fn new(channels: Vec<ChannelDescriptor>, oracle: Arc<dyn SystemOracle>) -> Self {
        Self {
            channels: RwLock::new(channels),
            oracle,
            relay_service: ACOUSTIC_RELAY_SERVICE.to_string(),
        }
    }

    /// Service name relays must advertise. Defaults to "acoustic/operation".
    pub fn with_relay_service(mut self, service: &str) -> Self {
        self.relay_service = service.to_string();
        self
    }

    pub fn oracle(&self) -> &Arc<dyn SystemOracle> {
        &self.oracle
    }

    /// Snapshot of every descriptor in priority order.
    pub fn descriptors(&self) -> Vec<ChannelDescriptor> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Case-insensitive lookup by id.
    pub fn get(&self, id: &str) -> Option<ChannelDescriptor> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.matches(id))
            .cloned()
    }

    /// Toggle a channel at runtime. Returns false if no channel has that id.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        match channels.iter_mut().find(|c| c.matches(id)) {
            Some(channel) => {
                channel.enabled = enabled;
                tracing::info!(channel = %channel.id, enabled, "channel toggled");
                true
            }
            None => false,
        }
    }

    /// Enabled channels whose id matches one of `names`, in priority order.
    pub fn enabled_matching(&self, names: &[String]) -> Vec<ChannelDescriptor> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.enabled && names.iter().any(|n| c.matches(n)))
            .cloned()
            .collect()
    }

    /// Every enabled channel, in priority order.
    pub fn enabled(&self) -> Vec<ChannelDescriptor> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect()
    }

    pub fn is_active(&self, channel: &ChannelDescriptor, destination: &SystemInfo) -> Route {
        self.is_active_with(channel, destination, &mut rand::thread_rng())
    }

    /// As [`is_active`](Self::is_active) with a caller-supplied shuffle source.
    pub fn is_active_with<R: Rng + ?Sized>(
        &self,
        channel: &ChannelDescriptor,
        destination: &SystemInfo,
        rng: &mut R,
    ) -> Route {
        match channel.kind {
            ChannelKind::Wifi => {
                if self.oracle.is_reachable(destination) {
                    Route::Direct
                } else {
                    Route::Inactive
                }
            }
            ChannelKind::Acoustic => {
                match discover_relay(self.oracle.as_ref(), &self.relay_service, destination, rng) {
                    Some(relay) => Route::Relay(relay),
                    None => Route::Inactive,
                }
            }
            ChannelKind::Satellite => {
                if self.oracle.satellite_available() {
                    Route::Bearer
                } else {
                    Route::Inactive
                }
            }
            ChannelKind::Cellular => Route::Inactive,
        }
    }
}
