//! Cross-instance publish/subscribe.
//!
//! Room membership is process-local, so every message is also published on a
//! shared channel and each instance fans it out to its own connections.
//! Delivery is fire-and-forget and ordered per publisher only.

mod local;
mod redis_pubsub;

pub use local::LocalBridge;
pub use redis_pubsub::RedisBridge;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::RelayResult;
use crate::message::Message;

/// Default channel messages are published on.
pub const DEFAULT_CHANNEL: &str = "MESSAGES";

/// Payloads received on a subscribed channel.
pub type BridgeStream = BoxStream<'static, String>;

#[async_trait]
pub trait BroadcastBridge: Send + Sync {
    /// Send a payload to every subscriber of `channel` on every instance.
    async fn publish(&self, channel: &str, payload: &str) -> RelayResult<()>;

    /// Start receiving payloads published on `channel`.
    async fn subscribe(&self, channel: &str) -> RelayResult<BridgeStream>;
}

/// What travels over the bridge: the message plus the instance that relayed
/// it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    pub origin: String,
    pub message: Message,
}

impl BridgeEnvelope {
    pub fn new(origin: impl Into<String>, message: Message) -> Self {
        Self {
            origin: origin.into(),
            message,
        }
    }

    pub fn encode(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> RelayResult<Self> {
        let envelope: BridgeEnvelope = serde_json::from_str(payload)?;
        envelope.message.validate()?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;

    #[test]
    fn envelope_carries_origin_and_message() {
        let message = Message::new("Q1", "hi", "u-1", "Ada", "").unwrap();
        let payload = BridgeEnvelope::new("node-a", message.clone()).encode().unwrap();

        let decoded = BridgeEnvelope::decode(&payload).unwrap();
        assert_eq!(decoded.origin, "node-a");
        assert_eq!(decoded.message, message);
    }

    #[test]
    fn envelope_without_room_is_rejected() {
        let payload = r#"{"origin":"n","message":{"roomId":"","text":"t","senderId":"s","senderName":"n"}}"#;
        assert!(matches!(BridgeEnvelope::decode(payload), Err(RelayError::EmptyRoom)));
    }
}
