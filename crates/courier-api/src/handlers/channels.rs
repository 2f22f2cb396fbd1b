//! /channels handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use courier_core::ChannelDescriptor;

use super::ApiState;

#[derive(Serialize)]
pub struct ChannelsResponse {
    /// Priority order.
    pub channels: Vec<ChannelDescriptor>,
}

pub async fn handle_channels(State(state): State<ApiState>) -> Json<ChannelsResponse> {
    Json(ChannelsResponse {
        channels: state.dispatcher.registry().descriptors(),
    })
}

#[derive(Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

pub async fn handle_channel_enabled(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<EnabledRequest>,
) -> Result<Json<ChannelDescriptor>, (StatusCode, String)> {
    let registry = state.dispatcher.registry();
    if !registry.set_enabled(&id, req.enabled) {
        return Err((StatusCode::NOT_FOUND, format!("unknown channel: {id}")));
    }
    registry
        .get(&id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("unknown channel: {id}")))
}
