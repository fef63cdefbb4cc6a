//! Redis pub/sub bridge for multi-instance deployments.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use super::{BridgeStream, BroadcastBridge};
use crate::error::{RelayError, RelayResult};

/// Bridge using `PUBLISH` on a managed connection and a dedicated pub/sub
/// connection per subscription.
#[derive(Clone)]
pub struct RedisBridge {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisBridge {
    pub fn new(client: redis::Client, publisher: ConnectionManager) -> Self {
        Self { client, publisher }
    }
}

#[async_trait]
impl BroadcastBridge for RedisBridge {
    async fn publish(&self, channel: &str, payload: &str) -> RelayResult<()> {
        let mut conn = self.publisher.clone();
        let _receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| RelayError::bridge(format!("PUBLISH on {channel} failed: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> RelayResult<BridgeStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| RelayError::bridge(format!("pub/sub connection failed: {e}")))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| RelayError::bridge(format!("SUBSCRIBE {channel} failed: {e}")))?;

        info!(%channel, "subscribed to redis channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(error) => {
                    warn!(
                        channel = msg.get_channel_name(),
                        %error,
                        "dropping undecodable bridge payload"
                    );
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
