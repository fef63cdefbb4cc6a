//! Comment entity definitions

use roomcast_relay::Message;
use serde::{Deserialize, Serialize};

/// A message as persisted in the `comments` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredComment {
    pub id: i64,
    pub public_id: String,
    pub room_id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_avatar: String,
    pub created_at: String,
}

impl StoredComment {
    /// The relay message this row was written from.
    pub fn to_message(&self) -> Message {
        Message {
            room_id: self.room_id.clone(),
            text: self.text.clone(),
            sender_id: self.sender_id.clone(),
            sender_name: self.sender_name.clone(),
            sender_avatar: self.sender_avatar.clone(),
        }
    }
}
