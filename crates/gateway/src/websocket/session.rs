//! One WebSocket connection: register with the hub, pump outbound events,
//! dispatch inbound frames, clean up on close.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use roomcast_relay::{ClientEvent, ConnectionId, EventRouter, ServerEvent};
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::state::GatewayState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let router = state.router.clone();
    // Counted from the upgrade request so shutdown also waits for sockets
    // that are still being upgraded.
    let session = state.sessions.enter();
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, router).await;
        drop(session);
    })
}

async fn handle_socket(socket: WebSocket, router: EventRouter) {
    let connection = ConnectionId::generate();
    let mut outbound = router.hub().register(connection.clone()).await;
    let (mut sender, mut receiver) = socket.split();
    if router.hub().is_closed().await {
        debug!(connection = %connection, "relay shutting down, closing new socket");
        let _ = sender.send(WsMessage::Close(None)).await;
        return;
    }
    info!(connection = %connection, "connection opened");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(error) => {
                    warn!(%error, "dropping unserializable event");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text)).await.is_err() {
                return;
            }
        }
        // The hub dropped this connection's sink.
        let _ = sender.send(WsMessage::Close(None)).await;
    });

    let inbound_router = router.clone();
    let inbound_connection = connection.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    handle_frame(&inbound_router, &inbound_connection, &text).await;
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(error) => {
                    debug!(connection = %inbound_connection, %error, "socket read failed");
                    break;
                }
            }
        }
    });

    // The aborted half is awaited so no frame is still being dispatched once
    // the session reports itself finished.
    tokio::select! {
        _ = &mut send_task => {
            receive_task.abort();
            let _ = receive_task.await;
        }
        _ = &mut receive_task => {
            send_task.abort();
            let _ = send_task.await;
        }
    }

    router.handle_disconnect(&connection).await;
    info!(connection = %connection, "connection closed");
}

/// Parse and dispatch one text frame. Failures are reported back to the
/// connection and never close it.
async fn handle_frame(router: &EventRouter, connection: &ConnectionId, text: &str) {
    let result = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => router
            .handle_event(connection, event)
            .await
            .map_err(GatewayError::from),
        Err(error) => Err(GatewayError::from(error)),
    };

    if let Err(error) = result {
        debug!(connection = %connection, %error, "rejected client frame");
        if let Err(send_error) = router
            .hub()
            .send(connection, ServerEvent::error(error.to_string()))
            .await
        {
            debug!(connection = %connection, error = %send_error, "could not report frame error");
        }
    }
}
