//! Client-facing event vocabulary.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Events received from a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Post a message into a room
    SendMessage(Message),
    /// Join a room
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Leave a room
    LeaveRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

/// Events delivered to a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A message posted into one of the connection's rooms
    Message { payload: Message },
    /// Join acknowledgement
    Joined {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Leave acknowledgement
    Left {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// A frame the server could not accept
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
