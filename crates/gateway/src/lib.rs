//! # Roomcast Gateway Crate
//!
//! HTTP surface of the relay: the `/ws` WebSocket endpoint clients use to
//! join rooms and post messages, and a `/health` probe reporting queue depth.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use roomcast_gateway::{create_router, GatewayState};
//! use roomcast_relay::{
//!     ConnectionHub, EventRouter, LocalBridge, MemoryQueue, RoomRegistry, RouterConfig,
//! };
//!
//! # async fn demo() -> std::io::Result<()> {
//! let queue = Arc::new(MemoryQueue::new());
//! let router = EventRouter::new(
//!     RoomRegistry::new(),
//!     ConnectionHub::default(),
//!     queue.clone(),
//!     Arc::new(LocalBridge::default()),
//!     RouterConfig::default(),
//! );
//! let app = create_router(GatewayState::new(router, queue));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(listener, app).await
//! # }
//! ```

pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{GatewayError, GatewayResult};
pub use state::{GatewayState, SessionTracker};

use std::sync::Arc;

use axum::{http::Method, middleware as axum_middleware, Router};
use tower_http::cors::{Any, CorsLayer};

/// Build the application router.
pub fn create_router(state: GatewayState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .merge(rest::create_rest_routes())
        .merge(websocket::create_websocket_routes())
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
