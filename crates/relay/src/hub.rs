//! Outbound sinks for live connections.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::events::ServerEvent;
use crate::message::ConnectionId;

/// Default number of undelivered events buffered per connection.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 100;

#[derive(Default)]
struct Sinks {
    connections: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    closed: bool,
}

/// Registry of live connections and the channels feeding their transports.
///
/// The transport registers each connection on connect and drains the returned
/// receiver into its socket; the relay only ever pushes events in. Once the
/// receiver yields `None` the transport should close its socket.
#[derive(Clone)]
pub struct ConnectionHub {
    sinks: Arc<RwLock<Sinks>>,
    buffer: usize,
}

impl ConnectionHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            sinks: Arc::new(RwLock::new(Sinks::default())),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection, replacing any previous sink with the same id.
    ///
    /// After [`close`](Self::close) the returned receiver is already closed.
    pub async fn register(&self, connection: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut sinks = self.sinks.write().await;
        if sinks.closed {
            debug!(connection = %connection, "hub closed, refusing connection");
            return rx;
        }
        debug!(connection = %connection, "registered connection");
        sinks.connections.insert(connection, tx);
        rx
    }

    /// Forget a connection. Returns `false` if it was not registered.
    pub async fn unregister(&self, connection: &ConnectionId) -> bool {
        let mut sinks = self.sinks.write().await;
        sinks.connections.remove(connection).is_some()
    }

    /// Drop every sink and refuse new registrations. Each transport sees its
    /// receiver end after the events already buffered for it. Returns the
    /// number of connections closed.
    pub async fn close(&self) -> usize {
        let mut sinks = self.sinks.write().await;
        sinks.closed = true;
        let closed = sinks.connections.len();
        sinks.connections.clear();
        debug!(closed, "connection hub closed");
        closed
    }

    pub async fn is_closed(&self) -> bool {
        self.sinks.read().await.closed
    }

    /// Queue an event for one connection without waiting on its transport.
    pub async fn send(&self, connection: &ConnectionId, event: ServerEvent) -> RelayResult<()> {
        let sinks = self.sinks.read().await;
        let sender = sinks
            .connections
            .get(connection)
            .ok_or_else(|| RelayError::ConnectionClosed(connection.clone()))?;

        sender.try_send(event).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => RelayError::SendRejected(connection.clone()),
            mpsc::error::TrySendError::Closed(_) => RelayError::ConnectionClosed(connection.clone()),
        })
    }

    pub async fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.sinks.read().await.connections.contains_key(connection)
    }

    pub async fn connection_count(&self) -> usize {
        self.sinks.read().await.connections.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_BUFFER)
    }
}
