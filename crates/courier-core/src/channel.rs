//! Channel descriptors: the transports a delivery can use.
//!
//! Channels are data, not code: the set and its priority order come from
//! configuration. `kind` selects the driver that knows how to use one.

use serde::{Deserialize, Serialize};

use crate::wire::{MAX_ACOUSTIC_PAYLOAD, MAX_BEARER_ENVELOPE};

/// Transport class of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Direct wireless link to the destination.
    Wifi,
    /// Underwater acoustic modem reached through a relay system.
    Acoustic,
    /// Satellite store-and-forward.
    Satellite,
    /// Cellular. Not implemented; never active.
    Cellular,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Wifi => "wifi",
            ChannelKind::Acoustic => "acoustic",
            ChannelKind::Satellite => "satellite",
            ChannelKind::Cellular => "cellular",
        }
    }
}

/// One configured channel. Position in the configured list is its priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Name used in channel filters, matched case-insensitively.
    pub id: String,
    pub display_name: String,
    pub kind: ChannelKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Whether the transport confirms delivery end to end.
    #[serde(default)]
    pub reliable: bool,
    /// Largest payload sent in one piece. None = unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<usize>,
}

fn enabled_by_default() -> bool {
    true
}

impl ChannelDescriptor {
    pub fn new(id: &str, display_name: &str, kind: ChannelKind) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind,
            enabled: true,
            reliable: false,
            max_payload: None,
        }
    }

    pub fn reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }

    pub fn max_payload(mut self, max: usize) -> Self {
        self.max_payload = Some(max);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Case-insensitive match against a filter name.
    pub fn matches(&self, name: &str) -> bool {
        self.id.eq_ignore_ascii_case(name)
    }

    /// The default channel set, fastest and most reliable first.
    pub fn defaults() -> Vec<ChannelDescriptor> {
        vec![
            ChannelDescriptor::new("Wifi", "Wi-Fi channel", ChannelKind::Wifi).reliable(true),
            ChannelDescriptor::new("Acoustic", "Acoustic channel", ChannelKind::Acoustic)
                .max_payload(MAX_ACOUSTIC_PAYLOAD),
            ChannelDescriptor::new("Satellite", "Satellite channel", ChannelKind::Satellite)
                .max_payload(MAX_BEARER_ENVELOPE),
            ChannelDescriptor::new("Cellular", "Cellular channel", ChannelKind::Cellular),
        ]
    }
}
