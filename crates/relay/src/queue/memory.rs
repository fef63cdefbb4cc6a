use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{settled_overlap, DurableQueue, QueueEntry};
use crate::error::{RelayError, RelayResult};

#[derive(Default)]
struct Arena {
    entries: Vec<QueueEntry>,
    /// index of the first live entry in `entries`
    head: usize,
    quarantine: Vec<QueueEntry>,
}

impl Arena {
    fn live(&self) -> &[QueueEntry] {
        &self.entries[self.head..]
    }

    fn compact(&mut self) {
        if self.head > 0 && self.head * 2 >= self.entries.len() {
            self.entries.drain(..self.head);
            self.head = 0;
        }
    }
}

/// In-process queue backed by an arena with a moving head.
///
/// Not durable across restarts. Optionally bounded: once `capacity` entries
/// are pending, appends fail until a drain trims some.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    arena: Arc<Mutex<Arena>>,
    capacity: Option<usize>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            arena: Arc::default(),
            capacity: Some(capacity),
        }
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn append(&self, entry: &str) -> RelayResult<()> {
        let mut arena = self.arena.lock().await;
        if let Some(capacity) = self.capacity {
            if arena.live().len() >= capacity {
                return Err(RelayError::QueueFull { capacity });
            }
        }
        arena.entries.push(entry.to_string());
        Ok(())
    }

    async fn peek_all(&self) -> RelayResult<Vec<QueueEntry>> {
        Ok(self.arena.lock().await.live().to_vec())
    }

    async fn trim_first(&self, count: usize) -> RelayResult<()> {
        let mut arena = self.arena.lock().await;
        let count = count.min(arena.live().len());
        arena.head += count;
        arena.compact();
        Ok(())
    }

    async fn trim_settled(&self, settled: &[QueueEntry]) -> RelayResult<usize> {
        let mut arena = self.arena.lock().await;
        let count = settled_overlap(settled, arena.live());
        arena.head += count;
        arena.compact();
        Ok(count)
    }

    async fn append_quarantine(&self, entry: &str) -> RelayResult<()> {
        self.arena.lock().await.quarantine.push(entry.to_string());
        Ok(())
    }

    async fn quarantined(&self) -> RelayResult<Vec<QueueEntry>> {
        Ok(self.arena.lock().await.quarantine.clone())
    }

    async fn len(&self) -> RelayResult<usize> {
        Ok(self.arena.lock().await.live().len())
    }
}
