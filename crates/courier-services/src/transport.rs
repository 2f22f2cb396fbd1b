//! Outbound sink ports. The daemon supplies UDP and spool implementations;
//! tests supply recording ones.

use std::sync::Arc;

use courier_core::{Message, TransmissionRequest};

use crate::bearer::BearerEnvelope;
use crate::oracle::SystemInfo;
use crate::tracker::DeliveryListener;

/// Synchronous refusal by a sink. Nothing was handed over.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no route to {0}")]
    NoRoute(String),

    #[error("outbound queue full")]
    QueueFull,

    #[error("transport closed")]
    Closed,

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("{0}")]
    Rejected(String),
}

/// Direct link (Wifi). The listener receives the eventual outcome.
pub trait DirectSender: Send + Sync {
    fn send(
        &self,
        destination: &SystemInfo,
        message: &Message,
        listener: Arc<dyn DeliveryListener>,
    ) -> Result<(), TransportError>;
}

/// Relay link: hands a transmission request to a relay for acoustic forwarding.
pub trait RelaySender: Send + Sync {
    fn send(
        &self,
        relay: &SystemInfo,
        request: &TransmissionRequest,
        listener: Arc<dyn DeliveryListener>,
    ) -> Result<(), TransportError>;
}

/// Satellite bearer. Acceptance is reported synchronously.
pub trait BearerSender: Send + Sync {
    fn send(&self, envelope: &BearerEnvelope) -> Result<(), TransportError>;
}
