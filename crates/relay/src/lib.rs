//! # Roomcast Relay Crate
//!
//! Core of the Roomcast message relay: room-scoped fan-out of live messages,
//! a durable at-least-once queue that decouples delivery from storage writes,
//! a flush worker that drains the queue into storage and quarantines poison
//! entries, and a broadcast bridge that keeps several server instances in
//! step.
//!
//! ## Architecture
//!
//! - **Rooms**: in-memory membership ([`RoomRegistry`])
//! - **Hub**: outbound sinks of live connections ([`ConnectionHub`])
//! - **Queue**: durable buffer plus quarantine ([`DurableQueue`])
//! - **Bridge**: cross-instance publish/subscribe ([`BroadcastBridge`])
//! - **Router**: inbound event handling ([`EventRouter`])
//! - **Flush**: periodic drain into storage ([`FlushWorker`])
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use roomcast_relay::{
//!     ConnectionHub, EventRouter, LocalBridge, MemoryQueue, RoomRegistry, RouterConfig,
//! };
//!
//! # async fn demo() {
//! let router = EventRouter::new(
//!     RoomRegistry::new(),
//!     ConnectionHub::default(),
//!     Arc::new(MemoryQueue::new()),
//!     Arc::new(LocalBridge::default()),
//!     RouterConfig::default(),
//! );
//! let _bridge_task = router.listen_bridge().await;
//! # }
//! ```

pub mod bridge;
pub mod error;
pub mod events;
pub mod flush;
pub mod hub;
pub mod message;
pub mod queue;
pub mod rooms;
pub mod router;
pub mod storage;

pub use bridge::{BridgeEnvelope, BridgeStream, BroadcastBridge, LocalBridge, RedisBridge};
pub use error::{RelayError, RelayResult};
pub use events::{ClientEvent, ServerEvent};
pub use flush::{DrainReport, FlushWorker, DEFAULT_FLUSH_INTERVAL};
pub use hub::{ConnectionHub, DEFAULT_OUTBOUND_BUFFER};
pub use message::{ConnectionId, Message};
pub use queue::{DurableQueue, MemoryQueue, QueueEntry, RedisQueue};
pub use rooms::RoomRegistry;
pub use router::{EventRouter, RouterConfig};
pub use storage::MessageStore;
