use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    /// Entries waiting for the next drain cycle
    pub queue_depth: usize,
    pub connections: usize,
    pub timestamp: String,
}

pub async fn health_check(
    State(state): State<Arc<GatewayState>>,
) -> GatewayResult<Json<HealthResponse>> {
    let queue_depth = state
        .queue
        .len()
        .await
        .map_err(|e| GatewayError::QueueUnavailable(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        queue_depth,
        connections: state.router.hub().connection_count().await,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
