//! Plain HTTP endpoints

pub mod health;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::GatewayState;

pub fn create_rest_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/health", get(health::health_check))
}
