//! HTTP API handlers: exposes dispatcher state as JSON.

pub mod channels;
pub mod control;
pub mod deliveries;
pub mod status;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;

use courier_core::SystemId;
use courier_services::{ControlLoops, SystemTable, TransmissionDispatcher};

#[derive(Clone)]
pub struct ApiState {
    /// This system's name and address.
    pub name: String,
    pub system_id: SystemId,
    pub dispatcher: Arc<TransmissionDispatcher>,
    pub systems: SystemTable,
    pub control: Arc<ControlLoops>,
    pub started_at: Instant,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Decode a hex payload from a request body.
fn parse_payload(hex_str: &str) -> Result<Vec<u8>, (StatusCode, String)> {
    hex::decode(hex_str).map_err(|_| (StatusCode::BAD_REQUEST, "invalid hex payload".to_string()))
}

pub use channels::{handle_channel_enabled, handle_channels};
pub use control::{handle_control_list, handle_control_start, handle_control_stop};
pub use deliveries::handle_delivery;
pub use status::{handle_status, handle_systems};
