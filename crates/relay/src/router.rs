//! Inbound event handling.
//!
//! A posted message is fanned out to the local room right away. Buffering in
//! the durable queue and publishing on the bridge are handed to two ordered
//! background side-channels, so a slow or failing backend never delays live
//! delivery and neither side-effect waits on the other.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeEnvelope, BroadcastBridge, DEFAULT_CHANNEL};
use crate::error::{RelayError, RelayResult};
use crate::events::{ClientEvent, ServerEvent};
use crate::hub::ConnectionHub;
use crate::message::{ConnectionId, Message};
use crate::queue::DurableQueue;
use crate::rooms::RoomRegistry;

/// Router settings
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Bridge channel messages are published and received on
    pub channel: String,
    /// Identifies this instance in bridge envelopes
    pub instance_id: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

enum Job {
    Run(String),
    Barrier(oneshot::Sender<()>),
}

/// Delivery of one message to the local members of its room.
#[derive(Clone)]
struct RoomFanout {
    rooms: RoomRegistry,
    hub: ConnectionHub,
}

impl RoomFanout {
    async fn deliver(&self, message: &Message, exclude: Option<&ConnectionId>) -> usize {
        let members = self.rooms.members_of(&message.room_id).await;
        let mut delivered = 0;

        for member in members.iter().filter(|member| Some(*member) != exclude) {
            let event = ServerEvent::Message {
                payload: message.clone(),
            };
            match self.hub.send(member, event).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(connection = %member, room_id = %message.room_id, %error, "dropped room delivery");
                }
            }
        }

        delivered
    }

    async fn deliver_bridged(&self, payload: &str, instance_id: &str) -> RelayResult<usize> {
        let envelope = BridgeEnvelope::decode(payload)
            .map_err(|e| RelayError::bridge(format!("undecodable bridge payload: {e}")))?;

        if envelope.origin == instance_id {
            return Ok(0);
        }

        let delivered = self.deliver(&envelope.message, None).await;
        debug!(
            origin = %envelope.origin,
            room_id = %envelope.message.room_id,
            delivered,
            "delivered bridged message"
        );
        Ok(delivered)
    }
}

struct RouterInner {
    fanout: RoomFanout,
    bridge: Arc<dyn BroadcastBridge>,
    config: RouterConfig,
    appends: mpsc::UnboundedSender<Job>,
    publishes: mpsc::UnboundedSender<Job>,
}

/// Entry point for client events.
///
/// Cheap to clone. Must be created inside a Tokio runtime: construction spawns
/// the queue and bridge side-channel tasks, which stop once every clone of the
/// router is dropped.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl EventRouter {
    pub fn new(
        rooms: RoomRegistry,
        hub: ConnectionHub,
        queue: Arc<dyn DurableQueue>,
        bridge: Arc<dyn BroadcastBridge>,
        config: RouterConfig,
    ) -> Self {
        let (appends, append_rx) = mpsc::unbounded_channel();
        let (publishes, publish_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_appends(queue, append_rx));
        tokio::spawn(run_publishes(
            bridge.clone(),
            config.channel.clone(),
            publish_rx,
        ));

        Self {
            inner: Arc::new(RouterInner {
                fanout: RoomFanout { rooms, hub },
                bridge,
                config,
                appends,
                publishes,
            }),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.inner.fanout.rooms
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.inner.fanout.hub
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.config.instance_id
    }

    /// Dispatch one parsed client event.
    pub async fn handle_event(&self, connection: &ConnectionId, event: ClientEvent) -> RelayResult<()> {
        match event {
            ClientEvent::SendMessage(message) => {
                self.handle_client_message(connection, message).await?;
            }
            ClientEvent::JoinRoom { room_id } => {
                self.handle_join(connection, &room_id).await?;
                self.reply(connection, ServerEvent::Joined { room_id }).await;
            }
            ClientEvent::LeaveRoom { room_id } => {
                self.handle_leave(connection, &room_id).await;
                self.reply(connection, ServerEvent::Left { room_id }).await;
            }
        }
        Ok(())
    }

    /// Relay a posted message.
    ///
    /// Fans out to every other local member of the room before returning, then
    /// hands the queue append and the bridge publish to the side-channels.
    /// Returns the number of connections the message was delivered to.
    pub async fn handle_client_message(
        &self,
        sender: &ConnectionId,
        message: Message,
    ) -> RelayResult<usize> {
        message.validate()?;

        let delivered = self.inner.fanout.deliver(&message, Some(sender)).await;
        info!(
            connection = %sender,
            room_id = %message.room_id,
            delivered,
            "broadcasting to room"
        );

        match message.to_entry() {
            Ok(entry) => self.submit(&self.inner.appends, entry, "queue"),
            Err(error) => warn!(%error, "could not serialize message for the queue"),
        }

        match BridgeEnvelope::new(self.instance_id(), message).encode() {
            Ok(payload) => self.submit(&self.inner.publishes, payload, "bridge"),
            Err(error) => warn!(%error, "could not encode bridge envelope"),
        }

        Ok(delivered)
    }

    pub async fn handle_join(&self, connection: &ConnectionId, room_id: &str) -> RelayResult<bool> {
        if room_id.trim().is_empty() {
            return Err(RelayError::EmptyRoom);
        }
        let joined = self.rooms().join(connection, room_id).await;
        info!(connection = %connection, room_id, "user joined room");
        Ok(joined)
    }

    pub async fn handle_leave(&self, connection: &ConnectionId, room_id: &str) -> bool {
        let left = self.rooms().leave(connection, room_id).await;
        info!(connection = %connection, room_id, "user left room");
        left
    }

    /// Forget a closed connection: leave every room and drop its sink.
    pub async fn handle_disconnect(&self, connection: &ConnectionId) {
        let rooms = self.rooms().leave_all(connection).await;
        self.hub().unregister(connection).await;
        debug!(connection = %connection, ?rooms, "connection removed");
    }

    /// Fan a payload received from the bridge out to local room members.
    ///
    /// Envelopes published by this instance are skipped: their local fan-out
    /// already happened when they were first handled.
    pub async fn deliver_bridge_payload(&self, payload: &str) -> RelayResult<usize> {
        self.inner
            .fanout
            .deliver_bridged(payload, &self.inner.config.instance_id)
            .await
    }

    /// Subscribe to the bridge channel and spawn the delivery task.
    pub async fn listen_bridge(&self) -> RelayResult<JoinHandle<()>> {
        let channel = self.inner.config.channel.clone();
        let mut stream = self.inner.bridge.subscribe(&channel).await?;
        let fanout = self.inner.fanout.clone();
        let instance_id = self.inner.config.instance_id.clone();

        Ok(tokio::spawn(async move {
            while let Some(payload) = stream.next().await {
                if let Err(error) = fanout.deliver_bridged(&payload, &instance_id).await {
                    warn!(%channel, %error, "ignoring bridge payload");
                }
            }
            info!(%channel, "bridge subscription ended");
        }))
    }

    /// Wait until every append and publish handed off so far was attempted.
    pub async fn settle(&self) {
        let (append_done, append_wait) = oneshot::channel();
        let (publish_done, publish_wait) = oneshot::channel();

        if self.inner.appends.send(Job::Barrier(append_done)).is_ok() {
            let _ = append_wait.await;
        }
        if self.inner.publishes.send(Job::Barrier(publish_done)).is_ok() {
            let _ = publish_wait.await;
        }
    }

    fn submit(&self, side_channel: &mpsc::UnboundedSender<Job>, payload: String, kind: &str) {
        if side_channel.send(Job::Run(payload)).is_err() {
            warn!(side_channel = kind, "side-channel closed, message not handed off");
        }
    }

    async fn reply(&self, connection: &ConnectionId, event: ServerEvent) {
        if let Err(error) = self.hub().send(connection, event).await {
            debug!(connection = %connection, %error, "could not acknowledge event");
        }
    }
}

async fn run_appends(queue: Arc<dyn DurableQueue>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Run(entry) => {
                if let Err(error) = queue.append(&entry).await {
                    warn!(%error, "failed to buffer message, it will not be persisted");
                }
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn run_publishes(
    bridge: Arc<dyn BroadcastBridge>,
    channel: String,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Run(payload) => {
                if let Err(error) = bridge.publish(&channel, &payload).await {
                    warn!(%channel, %error, "failed to publish message on bridge");
                }
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}
