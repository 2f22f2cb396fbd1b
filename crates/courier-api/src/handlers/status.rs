//! /status and /systems handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use courier_services::SystemOracle;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub system_id: String,
    pub uptime_secs: u64,
    pub systems_known: usize,
    pub systems_reachable: usize,
    pub channels_enabled: Vec<String>,
    pub satellite_available: bool,
    pub control_loops: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let systems = state.systems.snapshot();
    let systems_reachable = systems
        .iter()
        .filter(|e| state.systems.is_reachable(&e.info))
        .count();
    let channels_enabled = state
        .dispatcher
        .registry()
        .enabled()
        .into_iter()
        .map(|c| c.id)
        .collect();

    Json(StatusResponse {
        name: state.name.clone(),
        system_id: state.system_id.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        systems_known: systems.len(),
        systems_reachable,
        channels_enabled,
        satellite_available: state.systems.satellite_available(),
        control_loops: state.control.active().len(),
    })
}

// ── /systems ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SystemsResponse {
    pub systems: Vec<SystemJson>,
}

#[derive(Serialize)]
pub struct SystemJson {
    pub name: String,
    pub id: String,
    pub addr: Option<String>,
    pub services: Vec<String>,
    pub acoustic_reach: Vec<String>,
    pub reachable: bool,
    pub learned: bool,
    pub last_seen_secs: Option<u64>,
}

pub async fn handle_systems(State(state): State<ApiState>) -> Json<SystemsResponse> {
    let systems = state
        .systems
        .snapshot()
        .into_iter()
        .map(|e| SystemJson {
            reachable: state.systems.is_reachable(&e.info),
            name: e.info.name,
            id: e.info.id.to_string(),
            addr: e.addr.map(|a| a.to_string()),
            services: e.info.services,
            acoustic_reach: e.info.acoustic_reach,
            learned: e.learned,
            last_seen_secs: e.last_seen.map(|t| t.elapsed().as_secs()),
        })
        .collect();

    Json(SystemsResponse { systems })
}
