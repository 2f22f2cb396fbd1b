//! Channel selection.
//!
//! Candidates come out in registry priority order and activity is
//! evaluated lazily: a dispatch on Wifi never triggers relay discovery or
//! a satellite check.

use std::sync::Arc;

use courier_core::ChannelDescriptor;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::oracle::{SystemInfo, SystemOracle};
use crate::registry::{ChannelRegistry, Route};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no enabled channel matches the request")]
    NoCandidates,
}

/// A channel that is active for this destination and how it gets there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub channel: ChannelDescriptor,
    pub route: Route,
}

/// Pick a relay able to reach `destination` acoustically.
///
/// The oracle's list is shuffled locally so concurrent requests spread
/// over relays without sharing any state.
pub fn discover_relay<R: Rng + ?Sized>(
    oracle: &dyn SystemOracle,
    service: &str,
    destination: &SystemInfo,
    rng: &mut R,
) -> Option<SystemInfo> {
    let mut candidates = oracle.relay_candidates(service);
    candidates.shuffle(rng);
    candidates
        .into_iter()
        .find(|relay| oracle.relay_can_reach(relay, destination))
}

pub struct ChannelSelector {
    registry: Arc<ChannelRegistry>,
    default_channels: Vec<String>,
}

impl ChannelSelector {
    /// `default_channels` applies to requests without a filter; empty = all.
    pub fn new(registry: Arc<ChannelRegistry>, default_channels: Vec<String>) -> Self {
        Self {
            registry,
            default_channels,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn oracle(&self) -> &Arc<dyn SystemOracle> {
        self.registry.oracle()
    }

    /// Enabled channels named by `filter`, falling back to the defaults.
    pub fn filter(&self, filter: &[String]) -> Vec<ChannelDescriptor> {
        let names = if filter.is_empty() {
            &self.default_channels
        } else {
            filter
        };
        if names.is_empty() {
            self.registry.enabled()
        } else {
            self.registry.enabled_matching(names)
        }
    }

    /// Lazily evaluated candidates for `destination`.
    pub fn select<'a>(
        &'a self,
        filter: &[String],
        destination: &'a SystemInfo,
    ) -> Result<Candidates<'a>, SelectError> {
        let channels = self.filter(filter);
        if channels.is_empty() {
            return Err(SelectError::NoCandidates);
        }
        Ok(Candidates {
            pending: channels.into_iter(),
            registry: &self.registry,
            destination,
        })
    }
}

/// Iterator over active channels in priority order.
pub struct Candidates<'a> {
    pending: std::vec::IntoIter<ChannelDescriptor>,
    registry: &'a ChannelRegistry,
    destination: &'a SystemInfo,
}

impl Iterator for Candidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        for channel in self.pending.by_ref() {
            let route = self.registry.is_active(&channel, self.destination);
            if route.is_active() {
                return Some(Candidate { channel, route });
            }
            tracing::trace!(
                channel = %channel.id,
                destination = %self.destination.name,
                "channel inactive"
            );
        }
        None
    }
}
