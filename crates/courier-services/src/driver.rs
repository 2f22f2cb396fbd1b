//! Channel drivers: one per channel kind.
//!
//! A driver either commits the delivery to its channel
//! ([`DriveResult::Dispatched`]) or declines before anything was handed
//! over ([`DriveResult::Skipped`]), in which case the dispatcher tries the
//! next candidate. Once dispatched there is no fallback.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_core::wire::{ACOUSTIC_TIMEOUT_SECS, MAX_ACOUSTIC_PAYLOAD};
use courier_core::{
    now_millis, ChannelDescriptor, ChannelKind, DataKind, Message, TransmissionRequest,
};

use crate::bearer::BearerCodec;
use crate::fragment::{split, FragmentError};
use crate::oracle::{SystemInfo, SystemOracle};
use crate::registry::Route;
use crate::tracker::{DeliveryListener, DeliveryTracker, DispatchInfo, SequenceListener};
use crate::transport::{BearerSender, DirectSender, RelaySender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveResult {
    /// Committed. The tracker now owns the outcome.
    Dispatched,
    /// Declined before sending; try the next channel.
    Skipped(String),
}

/// Everything a driver needs for one attempt.
pub struct Transmission<'a> {
    pub channel: &'a ChannelDescriptor,
    pub route: &'a Route,
    pub destination: &'a SystemInfo,
    pub message: &'a Message,
    pub tracker: &'a Arc<DeliveryTracker>,
}

impl Transmission<'_> {
    fn dispatch_info(&self, relay: Option<&SystemInfo>, parts: usize) -> DispatchInfo {
        DispatchInfo {
            channel: self.channel.id.clone(),
            relay: relay.map(|r| r.name.clone()),
            parts,
        }
    }
}

pub trait ChannelDriver: Send + Sync {
    fn kind(&self) -> ChannelKind;
    fn transmit(&self, tx: &Transmission<'_>) -> DriveResult;
}

// ── Direct ───────────────────────────────────────────────────────────────────

/// Wifi: hands the message to the direct link with the tracker as listener.
pub struct DirectDriver {
    sender: Arc<dyn DirectSender>,
}

impl DirectDriver {
    pub fn new(sender: Arc<dyn DirectSender>) -> Self {
        Self { sender }
    }
}

impl ChannelDriver for DirectDriver {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Wifi
    }

    fn transmit(&self, tx: &Transmission<'_>) -> DriveResult {
        if *tx.route != Route::Direct {
            return DriveResult::Skipped("no direct link".into());
        }
        tx.tracker.record_dispatch(tx.dispatch_info(None, 1));
        let listener: Arc<dyn DeliveryListener> = tx.tracker.clone();
        match self.sender.send(tx.destination, tx.message, listener) {
            Ok(()) => tx.tracker.mark_sent(),
            Err(e) => {
                tracing::warn!(
                    destination = %tx.destination.name,
                    error = %e,
                    "direct send rejected"
                );
                tx.tracker.fail(format!("direct send rejected: {e}"));
            }
        }
        DriveResult::Dispatched
    }
}

// ── Relay ────────────────────────────────────────────────────────────────────

/// Acoustic: wraps the message (or its fragments) in transmission requests
/// and hands them to the chosen relay.
pub struct RelayDriver {
    sender: Arc<dyn RelaySender>,
    oracle: Arc<dyn SystemOracle>,
    acoustic_timeout: Duration,
    next_request: AtomicU32,
}

impl RelayDriver {
    pub fn new(sender: Arc<dyn RelaySender>, oracle: Arc<dyn SystemOracle>) -> Self {
        Self {
            sender,
            oracle,
            acoustic_timeout: Duration::from_secs(ACOUSTIC_TIMEOUT_SECS),
            next_request: AtomicU32::new(1),
        }
    }

    /// Relay-side deadline carried in every request.
    pub fn with_acoustic_timeout(mut self, timeout: Duration) -> Self {
        self.acoustic_timeout = timeout;
        self
    }

    /// One request per payload slice; `data` never exceeds the channel limit.
    fn requests(&self, tx: &Transmission<'_>) -> Result<Vec<TransmissionRequest>, FragmentError> {
        let max = tx.channel.max_payload.unwrap_or(MAX_ACOUSTIC_PAYLOAD);
        let deadline_millis = now_millis() + self.acoustic_timeout.as_millis() as u64;
        let fragments = split(&tx.message.payload, max, tx.message.request_id)?;
        let data_kind = if fragments.len() == 1 {
            DataKind::Message
        } else {
            DataKind::Fragment
        };

        Ok(fragments
            .into_iter()
            .map(|f| TransmissionRequest {
                request_id: self.next_request.fetch_add(1, Ordering::Relaxed),
                destination: tx.destination.id,
                data_kind,
                deadline_millis,
                parent_id: f.parent_id,
                index: f.index,
                total: f.total,
                data: f.payload,
            })
            .collect())
    }
}

impl ChannelDriver for RelayDriver {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Acoustic
    }

    fn transmit(&self, tx: &Transmission<'_>) -> DriveResult {
        let Route::Relay(relay) = tx.route else {
            return DriveResult::Skipped("no relay chosen".into());
        };
        if !self.oracle.is_reachable(relay) {
            return DriveResult::Skipped(format!("relay {} no longer reachable", relay.name));
        }
        let requests = match self.requests(tx) {
            Ok(requests) => requests,
            Err(e) => {
                tracing::warn!(error = %e, "could not build acoustic requests");
                return DriveResult::Skipped(format!("acoustic encode failed: {e}"));
            }
        };

        let parts = requests.len();
        let listener: Arc<dyn DeliveryListener> =
            SequenceListener::new(tx.tracker.clone(), parts);
        for (i, request) in requests.iter().enumerate() {
            match self.sender.send(relay, request, listener.clone()) {
                Ok(()) if i == 0 => {
                    tx.tracker.record_dispatch(tx.dispatch_info(Some(relay), parts));
                }
                Ok(()) => {}
                Err(e) if i == 0 => {
                    let reason = format!("relay {} refused request: {e}", relay.name);
                    return DriveResult::Skipped(reason);
                }
                Err(e) => {
                    tracing::warn!(
                        relay = %relay.name,
                        part = i,
                        parts,
                        error = %e,
                        "relay refused part"
                    );
                    tx.tracker
                        .fail(format!("relay {} refused part {i} of {parts}: {e}", relay.name));
                    return DriveResult::Dispatched;
                }
            }
        }
        tx.tracker.mark_sent();
        DriveResult::Dispatched
    }
}

// ── Bearer ───────────────────────────────────────────────────────────────────

/// Satellite: encodes into bounded bearer envelopes and spools them all.
pub struct BearerDriver {
    codec: BearerCodec,
    sender: Arc<dyn BearerSender>,
}

impl BearerDriver {
    pub fn new(sender: Arc<dyn BearerSender>) -> Self {
        Self {
            codec: BearerCodec::default(),
            sender,
        }
    }
}

impl ChannelDriver for BearerDriver {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Satellite
    }

    fn transmit(&self, tx: &Transmission<'_>) -> DriveResult {
        if *tx.route != Route::Bearer {
            return DriveResult::Skipped("satellite unavailable".into());
        }
        let codec = tx.channel.max_payload.map_or(self.codec, BearerCodec::new);
        let envelopes = match codec.encode(tx.message) {
            Ok(envelopes) => envelopes,
            Err(e) => {
                tx.tracker.record_dispatch(tx.dispatch_info(None, 0));
                tx.tracker.fail(format!("satellite encode failed: {e}"));
                return DriveResult::Dispatched;
            }
        };

        tracing::debug!(envelopes = envelopes.len(), "message encoded for satellite");
        tx.tracker.record_dispatch(tx.dispatch_info(None, envelopes.len()));
        for envelope in &envelopes {
            if let Err(e) = self.sender.send(envelope) {
                tx.tracker.fail(format!("satellite send failed: {e}"));
                return DriveResult::Dispatched;
            }
        }
        tx.tracker.mark_sent();
        tx.tracker.succeed();
        DriveResult::Dispatched
    }
}
