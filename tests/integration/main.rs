//! Courier integration test harness.
//!
//! Tests here drive a full dispatcher (registry, selector, every channel
//! driver and a real system table) against recording links, so whole
//! deliveries can be checked end to end without sockets or a modem.
//!
//!   cargo test --test integration
//!
//! Each test builds its own [`Harness`]; nothing is shared between tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_core::{ChannelDescriptor, Message, SystemId, TransmissionRequest};
use courier_services::{
    BearerDriver, BearerEnvelope, BearerSender, ChannelRegistry, ChannelSelector,
    DeliveryListener, DirectDriver, DirectSender, RelayDriver, RelaySender, SystemInfo,
    SystemTable, TransmissionDispatcher, TransportError,
};

mod acoustic;
mod config;
mod control;
mod delivery;
mod satellite;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const LOCAL_ID: SystemId = SystemId(0x4001);
pub const RELAY_SERVICE: &str = "acoustic/operation";

/// How the recording Wifi link answers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    /// Accept and report success immediately.
    Deliver,
    /// Accept and never report.
    Silent,
    /// Refuse synchronously.
    Refuse,
}

pub struct WifiLink {
    pub mode: Mutex<WifiMode>,
    pub sent: Mutex<Vec<(String, Message)>>,
}

impl DirectSender for WifiLink {
    fn send(
        &self,
        destination: &SystemInfo,
        message: &Message,
        listener: Arc<dyn DeliveryListener>,
    ) -> Result<(), TransportError> {
        let mode = *self.mode.lock().unwrap();
        if mode == WifiMode::Refuse {
            return Err(TransportError::QueueFull);
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.name.clone(), message.clone()));
        if mode == WifiMode::Deliver {
            listener.on_success();
        }
        Ok(())
    }
}

/// Records relay requests and keeps their listeners so tests decide the outcome.
#[derive(Default)]
pub struct RelayLink {
    pub sent: Mutex<Vec<(String, TransmissionRequest)>>,
    pub listeners: Mutex<Vec<Arc<dyn DeliveryListener>>>,
    /// Refuse every request from this index on.
    pub refuse_from: Mutex<Option<usize>>,
}

impl RelaySender for RelayLink {
    fn send(
        &self,
        relay: &SystemInfo,
        request: &TransmissionRequest,
        listener: Arc<dyn DeliveryListener>,
    ) -> Result<(), TransportError> {
        let mut sent = self.sent.lock().unwrap();
        if let Some(limit) = *self.refuse_from.lock().unwrap() {
            if sent.len() >= limit {
                return Err(TransportError::Rejected("relay busy".into()));
            }
        }
        sent.push((relay.name.clone(), request.clone()));
        self.listeners.lock().unwrap().push(listener);
        Ok(())
    }
}

impl RelayLink {
    pub fn report_all_uncertain(&self) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener.on_uncertain("acoustic delivery unconfirmed");
        }
    }
}

#[derive(Default)]
pub struct SpoolLink {
    pub envelopes: Mutex<Vec<BearerEnvelope>>,
}

impl BearerSender for SpoolLink {
    fn send(&self, envelope: &BearerEnvelope) -> Result<(), TransportError> {
        self.envelopes.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

pub struct Harness {
    pub systems: SystemTable,
    pub wifi: Arc<WifiLink>,
    pub relay: Arc<RelayLink>,
    pub spool: Arc<SpoolLink>,
    pub dispatcher: Arc<TransmissionDispatcher>,
}

impl Harness {
    /// Default channels; "auv-1" is known but silent, "buoy" is a live relay
    /// that reaches "auv-1" acoustically, satellite is down.
    pub fn new() -> Self {
        Self::configured(|dispatcher| dispatcher)
    }

    /// Like [`Harness::new`], with extra dispatcher settings applied.
    pub fn configured(
        configure: impl FnOnce(TransmissionDispatcher) -> TransmissionDispatcher,
    ) -> Self {
        let systems = SystemTable::new(Duration::from_secs(10));
        systems.insert(SystemInfo::new("auv-1", 0x15), None);
        systems.insert(
            SystemInfo::new("buoy", 0x30)
                .with_service(RELAY_SERVICE)
                .with_acoustic_reach("auv-1"),
            None,
        );
        systems.touch("buoy");

        let wifi = Arc::new(WifiLink {
            mode: Mutex::new(WifiMode::Deliver),
            sent: Mutex::new(Vec::new()),
        });
        let relay = Arc::new(RelayLink::default());
        let spool = Arc::new(SpoolLink::default());

        let registry = Arc::new(
            ChannelRegistry::new(ChannelDescriptor::defaults(), Arc::new(systems.clone()))
                .with_relay_service(RELAY_SERVICE),
        );
        let selector = ChannelSelector::new(
            registry,
            vec!["Wifi".into(), "Acoustic".into(), "Satellite".into()],
        );
        let dispatcher = TransmissionDispatcher::new(LOCAL_ID, selector)
            .with_driver(Arc::new(DirectDriver::new(wifi.clone())))
            .with_driver(Arc::new(RelayDriver::new(
                relay.clone(),
                Arc::new(systems.clone()),
            )))
            .with_driver(Arc::new(BearerDriver::new(spool.clone())));

        Self {
            systems,
            wifi,
            relay,
            spool,
            dispatcher: Arc::new(configure(dispatcher)),
        }
    }

    pub fn wifi_mode(&self, mode: WifiMode) {
        *self.wifi.mode.lock().unwrap() = mode;
    }

    pub fn wifi_sent(&self) -> usize {
        self.wifi.sent.lock().unwrap().len()
    }

    pub fn relay_sent(&self) -> Vec<(String, TransmissionRequest)> {
        self.relay.sent.lock().unwrap().clone()
    }

    pub fn spooled(&self) -> Vec<BearerEnvelope> {
        self.spool.envelopes.lock().unwrap().clone()
    }
}

pub fn payload(len: usize) -> Message {
    Message::new((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}
