//! /deliveries handler: submit a message and wait for its outcome.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use courier_core::Message;
use courier_services::{DeliveryOutcome, DeliveryRequest, DispatchInfo};

use super::{parse_payload, ApiState};

#[derive(Deserialize)]
pub struct DeliveryBody {
    pub destination: String,
    /// Hex-encoded opaque payload.
    pub payload: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub confirm_required: bool,
}

#[derive(Serialize)]
pub struct DeliveryResponse {
    pub request_id: u32,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
    pub dispatch: Option<DispatchInfo>,
}

pub async fn handle_delivery(
    State(state): State<ApiState>,
    Json(body): Json<DeliveryBody>,
) -> Result<Json<DeliveryResponse>, (StatusCode, String)> {
    let payload = parse_payload(&body.payload)?;
    let timeout = body
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.dispatcher.default_timeout());

    let request = DeliveryRequest::new(Message::new(payload), &body.destination)
        .timeout(timeout)
        .channels(&body.channels)
        .confirm_required(body.confirm_required);
    // Drivers may block on file or socket I/O.
    let dispatcher = state.dispatcher.clone();
    let handle = tokio::task::spawn_blocking(move || dispatcher.dispatch(request))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("dispatch failed: {e}")))?;
    let outcome = handle.get_async(timeout).await;

    tracing::debug!(request_id = handle.request_id(), outcome = outcome.code(), "delivery finished");
    Ok(Json(DeliveryResponse {
        request_id: handle.request_id(),
        outcome,
        dispatch: handle.dispatch_info(),
    }))
}
