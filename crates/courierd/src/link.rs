//! UDP link: outbound queue, send worker and inbound datagram loop.
//!
//! Direct messages and relay transmission requests are queued as
//! datagrams and drained by a single [`SendWorker`]. The dispatcher never
//! waits on the socket: a full queue is a synchronous rejection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};

use courier_core::{Message, TransmissionRequest};
use courier_services::{
    DeliveryListener, DirectSender, RelaySender, SystemInfo, SystemTable, TransportError,
};

use crate::announce::{self, Announcement};

/// One queued datagram and whoever wants to hear how it went.
pub struct Outbound {
    pub addr: SocketAddr,
    pub bytes: Vec<u8>,
    pub listener: Arc<dyn DeliveryListener>,
    /// Delivered once written; otherwise only forwarded and reported uncertain.
    pub confirmed: bool,
}

fn enqueue(tx: &mpsc::Sender<Outbound>, outbound: Outbound) -> Result<(), TransportError> {
    tx.try_send(outbound).map_err(|e| match e {
        TrySendError::Full(_) => TransportError::QueueFull,
        TrySendError::Closed(_) => TransportError::Closed,
    })
}

/// Wifi link over UDP.
pub struct UdpDirectSender {
    systems: SystemTable,
    tx: mpsc::Sender<Outbound>,
}

impl UdpDirectSender {
    pub fn new(systems: SystemTable, tx: mpsc::Sender<Outbound>) -> Self {
        Self { systems, tx }
    }
}

impl DirectSender for UdpDirectSender {
    fn send(
        &self,
        destination: &SystemInfo,
        message: &Message,
        listener: Arc<dyn DeliveryListener>,
    ) -> Result<(), TransportError> {
        let addr = self
            .systems
            .addr_of(&destination.name)
            .ok_or_else(|| TransportError::NoRoute(destination.name.clone()))?;
        let bytes = message
            .to_bytes()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        enqueue(
            &self.tx,
            Outbound {
                addr,
                bytes,
                listener,
                confirmed: true,
            },
        )
    }
}

/// Acoustic relay requests over UDP to the relay system.
pub struct UdpRelaySender {
    systems: SystemTable,
    tx: mpsc::Sender<Outbound>,
}

impl UdpRelaySender {
    pub fn new(systems: SystemTable, tx: mpsc::Sender<Outbound>) -> Self {
        Self { systems, tx }
    }
}

impl RelaySender for UdpRelaySender {
    fn send(
        &self,
        relay: &SystemInfo,
        request: &TransmissionRequest,
        listener: Arc<dyn DeliveryListener>,
    ) -> Result<(), TransportError> {
        let addr = self
            .systems
            .addr_of(&relay.name)
            .ok_or_else(|| TransportError::NoRoute(relay.name.clone()))?;
        let bytes = request
            .to_bytes()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        enqueue(
            &self.tx,
            Outbound {
                addr,
                bytes,
                listener,
                confirmed: false,
            },
        )
    }
}

pub struct SendWorker {
    socket: Arc<UdpSocket>,
    rx: mpsc::Receiver<Outbound>,
    shutdown: broadcast::Receiver<()>,
}

impl SendWorker {
    pub fn new(
        socket: Arc<UdpSocket>,
        rx: mpsc::Receiver<Outbound>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            rx,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("send worker shutting down");
                    return Ok(());
                }

                msg = self.rx.recv() => {
                    let Some(outbound) = msg else {
                        tracing::info!("outbound queue dropped, send worker exiting");
                        return Ok(());
                    };
                    self.send(outbound).await;
                }
            }
        }
    }

    async fn send(&self, outbound: Outbound) {
        match self.socket.send_to(&outbound.bytes, outbound.addr).await {
            Ok(len) => {
                tracing::trace!(addr = %outbound.addr, len, "datagram sent");
                if outbound.confirmed {
                    outbound.listener.on_success();
                } else {
                    outbound
                        .listener
                        .on_uncertain("handed to relay, acoustic delivery unconfirmed");
                }
            }
            Err(e) => {
                tracing::warn!(addr = %outbound.addr, error = %e, "send_to failed");
                outbound.listener.on_error(&format!("send to {} failed: {e}", outbound.addr));
            }
        }
    }
}

/// Read inbound datagrams: announcements feed the system table, anything
/// else is decoded as a message and logged.
///
/// Runs forever; cancel by dropping the task handle.
pub async fn receive_loop(
    socket: Arc<UdpSocket>,
    systems: SystemTable,
    local_name: String,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    tracing::info!("link receiver starting");

    loop {
        let (len, peer_addr) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "recv_from failed");
                continue;
            }
        };
        let datagram = &buf[..len];

        if let Some(announcement) = announce::parse(datagram) {
            if announcement.name != local_name {
                observe(&systems, announcement, peer_addr);
            }
            continue;
        }

        match Message::from_bytes(datagram) {
            Ok(message) => tracing::info!(
                from = %message.source,
                request_id = message.request_id,
                len = message.payload_size(),
                payload = hex::encode(&message.payload[..message.payload.len().min(16)]),
                "message received"
            ),
            Err(e) => tracing::debug!(addr = %peer_addr, error = %e, "unrecognised datagram"),
        }
    }
}

fn observe(systems: &SystemTable, announcement: Announcement, addr: SocketAddr) {
    tracing::debug!(system = %announcement.name, %addr, "system announced");
    systems.observe(announcement.into_info(), addr);
}
