use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use mission_control_agent::ToolRegistry;
use serde::Serialize;

pub const LIVENESS_TEXT: &str = "Mission Control bot is running";

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<ToolRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub modules: Vec<String>,
    pub tools: usize,
    pub checked_at: String,
}

pub fn router(registry: Arc<ToolRegistry>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .with_state(HealthState { registry })
}

pub async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

/// Reports which modules were configured at startup. Performs no backend I/O.
pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ready",
        modules: state.registry.module_names().into_iter().map(str::to_owned).collect(),
        tools: state.registry.tools().len(),
        checked_at: Utc::now().to_rfc3339(),
    })
}
