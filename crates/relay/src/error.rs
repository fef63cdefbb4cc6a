//! Error types for the relay core.

use thiserror::Error;

use crate::message::ConnectionId;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Failures raised by the relay core.
///
/// None of these are fatal to the process: queue and bridge errors are logged
/// and skipped, malformed and persistence errors are routed to quarantine, and
/// connection errors are reported to whoever tried to deliver.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Queue unavailable: {0}")]
    Queue(String),

    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Malformed queue entry: {0}")]
    MalformedEntry(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("Outbound buffer for connection {0} is full")]
    SendRejected(ConnectionId),

    #[error("Message has an empty room id")]
    EmptyRoom,
}

impl RelayError {
    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }

    /// Create a malformed entry error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEntry(message.into())
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a bridge error
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge(message.into())
    }

    /// Whether the failure belongs to the durable queue and will be retried
    /// naturally on the next drain cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Queue(_) | Self::QueueFull { .. })
    }

    /// Whether an entry hitting this failure belongs in quarantine.
    pub fn is_quarantinable(&self) -> bool {
        matches!(self, Self::MalformedEntry(_) | Self::Persistence(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedEntry(err.to_string())
    }
}
