//! Domain types shared by every relay component.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// A chat message posted into a room.
///
/// All fields are opaque to the relay; the only structural rule is that
/// `room_id` is not empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub room_id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: String,
}

impl Message {
    pub fn new(
        room_id: impl Into<String>,
        text: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        sender_avatar: impl Into<String>,
    ) -> RelayResult<Self> {
        let message = Self {
            room_id: room_id.into(),
            text: text.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            sender_avatar: sender_avatar.into(),
        };
        message.validate()?;
        Ok(message)
    }

    /// Check the structural invariant.
    pub fn validate(&self) -> RelayResult<()> {
        if self.room_id.trim().is_empty() {
            return Err(RelayError::EmptyRoom);
        }
        Ok(())
    }

    /// Serialize into the raw form stored in the durable queue.
    pub fn to_entry(&self) -> RelayResult<String> {
        serde_json::to_string(self).map_err(|e| RelayError::malformed(e.to_string()))
    }

    /// Parse a raw queue entry back into a message.
    pub fn from_entry(raw: &str) -> RelayResult<Self> {
        let message: Message = serde_json::from_str(raw)?;
        message
            .validate()
            .map_err(|_| RelayError::malformed("entry has an empty room id"))?;
        Ok(message)
    }
}

/// Identifier of one live client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
