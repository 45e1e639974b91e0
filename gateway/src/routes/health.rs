//! GET /health: liveness probe.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn handle(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
