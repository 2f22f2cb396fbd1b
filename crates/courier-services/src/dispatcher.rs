//! Transmission dispatcher.
//!
//! Resolves the destination, walks the selector's candidates in priority
//! order and stops at the first channel whose driver commits. Selection
//! runs on the caller's thread; the outcome arrives later through the
//! returned [`DeliveryHandle`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_core::wire::COMM_TIMEOUT_MILLIS;
use courier_core::{ChannelDescriptor, ChannelKind, Message, SystemId};

use crate::driver::{ChannelDriver, DriveResult, Transmission};
use crate::oracle::SystemInfo;
use crate::registry::ChannelRegistry;
use crate::selector::ChannelSelector;
use crate::tracker::{DeliveryOutcome, DeliveryStage, DeliveryTracker, DispatchInfo};

/// One delivery as submitted by a caller.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub message: Message,
    /// Destination system name.
    pub destination: String,
    /// None = the dispatcher's default timeout.
    pub timeout: Option<Duration>,
    /// Channel names to consider. Empty = configured defaults.
    pub channels: Vec<String>,
    /// Ask the confirmer before using any channel other than Wifi.
    pub confirm_required: bool,
}

impl DeliveryRequest {
    pub fn new(message: Message, destination: &str) -> Self {
        Self {
            message,
            destination: destination.to_string(),
            timeout: None,
            channels: Vec::new(),
            confirm_required: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn channels<S: AsRef<str>>(mut self, channels: &[S]) -> Self {
        self.channels = channels.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn confirm_required(mut self, required: bool) -> Self {
        self.confirm_required = required;
        self
    }
}

/// Gate consulted before a non-Wifi channel is used on a request that asks
/// for confirmation.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, channel: &ChannelDescriptor, destination: &SystemInfo) -> bool;
}

/// Approves everything.
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _channel: &ChannelDescriptor, _destination: &SystemInfo) -> bool {
        true
    }
}

/// Caller's view of an in-flight delivery.
#[derive(Clone)]
pub struct DeliveryHandle {
    tracker: Arc<DeliveryTracker>,
}

impl DeliveryHandle {
    pub fn request_id(&self) -> u32 {
        self.tracker.request_id()
    }

    /// Block until settled or the delivery's own timeout elapses.
    pub fn get(&self) -> DeliveryOutcome {
        self.tracker.wait()
    }

    pub fn get_timeout(&self, timeout: Duration) -> DeliveryOutcome {
        self.tracker.wait_timeout(timeout)
    }

    pub async fn get_async(&self, timeout: Duration) -> DeliveryOutcome {
        self.tracker.wait_async(timeout).await
    }

    pub fn outcome(&self) -> Option<DeliveryOutcome> {
        self.tracker.outcome()
    }

    pub fn stage(&self) -> DeliveryStage {
        self.tracker.stage()
    }

    pub fn dispatch_info(&self) -> Option<DispatchInfo> {
        self.tracker.dispatch_info()
    }

    pub fn tracker(&self) -> &Arc<DeliveryTracker> {
        &self.tracker
    }
}

pub struct TransmissionDispatcher {
    local_id: SystemId,
    selector: ChannelSelector,
    drivers: HashMap<ChannelKind, Arc<dyn ChannelDriver>>,
    confirmer: Arc<dyn Confirmer>,
    default_timeout: Duration,
    next_request_id: AtomicU32,
}

impl TransmissionDispatcher {
    /// A dispatcher with no drivers. Channels without a driver are skipped.
    pub fn new(local_id: SystemId, selector: ChannelSelector) -> Self {
        Self {
            local_id,
            selector,
            drivers: HashMap::new(),
            confirmer: Arc::new(AutoConfirm),
            default_timeout: Duration::from_millis(COMM_TIMEOUT_MILLIS),
            next_request_id: AtomicU32::new(1),
        }
    }

    /// Register a driver, replacing any other driver of the same kind.
    pub fn with_driver(mut self, driver: Arc<dyn ChannelDriver>) -> Self {
        self.drivers.insert(driver.kind(), driver);
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Timeout for requests that do not carry their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn local_id(&self) -> SystemId {
        self.local_id
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        self.selector.registry()
    }

    pub fn submit(
        &self,
        message: Message,
        destination: &str,
        timeout: Duration,
        channels: &[&str],
    ) -> DeliveryHandle {
        self.dispatch(
            DeliveryRequest::new(message, destination)
                .timeout(timeout)
                .channels(channels),
        )
    }

    pub fn dispatch(&self, request: DeliveryRequest) -> DeliveryHandle {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let tracker = DeliveryTracker::new(request_id, timeout);
        let handle = DeliveryHandle {
            tracker: tracker.clone(),
        };

        let Some(destination) = self.selector.oracle().resolve(&request.destination) else {
            tracing::info!(request_id, destination = %request.destination, "unknown destination");
            tracker.mark_unreachable();
            return handle;
        };

        let mut message = request.message;
        message.request_id = request_id;
        message.source = self.local_id;
        message.destination = destination.id;

        let candidates = match self.selector.select(&request.channels, &destination) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::info!(request_id, destination = %destination.name, "{e}");
                tracker.mark_unreachable();
                return handle;
            }
        };

        for candidate in candidates {
            let channel = &candidate.channel;
            let Some(driver) = self.drivers.get(&channel.kind) else {
                tracing::debug!(request_id, channel = %channel.id, "no driver for channel");
                continue;
            };
            if request.confirm_required
                && channel.kind != ChannelKind::Wifi
                && !self.confirmer.confirm(channel, &destination)
            {
                tracing::info!(request_id, channel = %channel.id, "channel declined by confirmer");
                continue;
            }

            let tx = Transmission {
                channel,
                route: &candidate.route,
                destination: &destination,
                message: &message,
                tracker: &tracker,
            };
            match driver.transmit(&tx) {
                DriveResult::Dispatched => {
                    let info = tracker.dispatch_info();
                    tracing::info!(
                        request_id,
                        destination = %destination.name,
                        channel = %channel.id,
                        relay = info.as_ref().and_then(|i| i.relay.as_deref()).unwrap_or("-"),
                        parts = info.as_ref().map_or(0, |i| i.parts),
                        "delivery dispatched"
                    );
                    return handle;
                }
                DriveResult::Skipped(reason) => {
                    tracing::debug!(request_id, channel = %channel.id, %reason, "channel skipped");
                }
            }
        }

        tracing::info!(request_id, destination = %destination.name, "no channel could be used");
        tracker.mark_unreachable();
        handle
    }
}
