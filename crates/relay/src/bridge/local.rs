//! In-process bridge for single-instance deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use super::{BridgeStream, BroadcastBridge};
use crate::error::RelayResult;

const DEFAULT_BUFFER: usize = 256;

/// Bridge backed by one `tokio::sync::broadcast` channel per topic.
#[derive(Clone)]
pub struct LocalBridge {
    /// Topic -> broadcast sender.
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
    buffer_size: usize,
}

impl LocalBridge {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }
}

impl Default for LocalBridge {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

#[async_trait]
impl BroadcastBridge for LocalBridge {
    async fn publish(&self, channel: &str, payload: &str) -> RelayResult<()> {
        let topics = self.topics.lock().await;
        if let Some(tx) = topics.get(channel) {
            // no subscribers is not an error
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> RelayResult<BridgeStream> {
        let rx = {
            let mut topics = self.topics.lock().await;
            topics
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.buffer_size).0)
                .subscribe()
        };

        let channel = channel.to_string();
        let stream = stream::unfold((rx, channel), |(mut rx, channel)| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, (rx, channel))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%channel, skipped, "bridge subscriber lagged, payloads dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bridge = LocalBridge::default();
        let mut first = bridge.subscribe("MESSAGES").await.unwrap();
        let mut second = bridge.subscribe("MESSAGES").await.unwrap();

        bridge.publish("MESSAGES", "one").await.unwrap();
        bridge.publish("MESSAGES", "two").await.unwrap();

        assert_eq!(first.next().await.as_deref(), Some("one"));
        assert_eq!(first.next().await.as_deref(), Some("two"));
        assert_eq!(second.next().await.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let bridge = LocalBridge::default();
        let mut other = bridge.subscribe("OTHER").await.unwrap();
        let mut messages = bridge.subscribe("MESSAGES").await.unwrap();

        bridge.publish("MESSAGES", "hello").await.unwrap();
        bridge.publish("OTHER", "else").await.unwrap();

        assert_eq!(messages.next().await.as_deref(), Some("hello"));
        assert_eq!(other.next().await.as_deref(), Some("else"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bridge = LocalBridge::default();
        bridge.publish("MESSAGES", "nobody listens").await.unwrap();
    }
}
