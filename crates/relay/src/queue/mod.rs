//! Durable buffering between live delivery and storage writes.
//!
//! The queue is read with [`DurableQueue::peek_all`] and, once the batch is
//! settled, trimmed with [`DurableQueue::trim_settled`]. The trim compares
//! the head of the list against the settled entries under one atomic step,
//! so neither appends made during the cycle nor a second drainer sharing the
//! list can cause an unsettled entry to be dropped.
//!
//! Backends:
//!
//! - [`RedisQueue`]: Redis lists, shared by every server instance
//! - [`MemoryQueue`]: in-process arena for tests and single-process setups
//!
//! The SQLite backend lives in `roomcast-database`.

mod memory;
mod redis_list;

pub use memory::MemoryQueue;
pub use redis_list::RedisQueue;

use async_trait::async_trait;

use crate::error::RelayResult;

/// Default key of the pending list.
pub const DEFAULT_QUEUE_KEY: &str = "MESSAGES";
/// Default key of the quarantine list.
pub const DEFAULT_QUARANTINE_KEY: &str = "FAILED_MESSAGES";

/// A serialized message as held by the queue.
pub type QueueEntry = String;

/// Ordered, persistent buffer of pending messages plus an append-only
/// quarantine list.
///
/// Each operation must be atomic on its own; callers never hold a lock across
/// calls.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Append an entry at the tail.
    async fn append(&self, entry: &str) -> RelayResult<()>;

    /// Every pending entry in insertion order, without removing anything.
    async fn peek_all(&self) -> RelayResult<Vec<QueueEntry>>;

    /// Remove exactly the first `count` entries.
    async fn trim_first(&self, count: usize) -> RelayResult<()>;

    /// Remove the settled entries still at the head of the queue and return
    /// how many were removed.
    ///
    /// `settled` is a prefix of an earlier [`peek_all`](Self::peek_all). If
    /// another drainer already trimmed part of it, only the overlap between
    /// the tail of `settled` and the current head goes, as computed by
    /// [`settled_overlap`]. Check and removal happen atomically.
    async fn trim_settled(&self, settled: &[QueueEntry]) -> RelayResult<usize>;

    /// Append an entry to the quarantine list.
    async fn append_quarantine(&self, entry: &str) -> RelayResult<()>;

    /// Every quarantined entry in insertion order.
    async fn quarantined(&self) -> RelayResult<Vec<QueueEntry>>;

    /// Number of pending entries.
    async fn len(&self) -> RelayResult<usize>;

    async fn is_empty(&self) -> RelayResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Length of the longest tail of `settled` that the queue `head` starts with.
///
/// Every entry counted here equals one this caller settled, so trimming that
/// many entries never removes a message nobody has stored.
pub fn settled_overlap(settled: &[QueueEntry], head: &[QueueEntry]) -> usize {
    let longest = settled.len().min(head.len());
    (1..=longest)
        .rev()
        .find(|&k| settled[settled.len() - k..] == head[..k])
        .unwrap_or(0)
}
