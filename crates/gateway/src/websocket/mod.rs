//! WebSocket endpoint for room clients

pub mod session;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::GatewayState;

pub fn create_websocket_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/ws", get(session::websocket_handler))
}
