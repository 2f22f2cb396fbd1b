//! /control handlers: periodic command loops.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use courier_core::Message;
use courier_services::ControlLoopInfo;

use super::{parse_payload, ApiState};

#[derive(Serialize)]
pub struct ControlListResponse {
    pub loops: Vec<ControlLoopInfo>,
}

pub async fn handle_control_list(State(state): State<ApiState>) -> Json<ControlListResponse> {
    Json(ControlListResponse {
        loops: state.control.active(),
    })
}

#[derive(Deserialize)]
pub struct ControlStartRequest {
    pub target: String,
    pub period_ms: u64,
    /// Hex-encoded command sent on every tick.
    pub payload: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

pub async fn handle_control_start(
    State(state): State<ApiState>,
    Json(req): Json<ControlStartRequest>,
) -> Result<Json<ControlListResponse>, (StatusCode, String)> {
    let payload = Bytes::from(parse_payload(&req.payload)?);
    state
        .control
        .start(
            &req.target,
            Duration::from_millis(req.period_ms),
            req.channels,
            Arc::new(move || Message::new(payload.clone())),
        )
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(ControlListResponse {
        loops: state.control.active(),
    }))
}

#[derive(Deserialize)]
pub struct ControlStopRequest {
    pub target: String,
}

pub async fn handle_control_stop(
    State(state): State<ApiState>,
    Json(req): Json<ControlStopRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.control.stop(&req.target) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            format!("no control loop for {}", req.target),
        ))
    }
}
