//! Long-term storage seam used by the flush worker.

use async_trait::async_trait;

use crate::error::RelayResult;
use crate::message::Message;

/// Persists messages drained from the durable queue.
///
/// Implementations report rejected writes as [`RelayError::Persistence`];
/// the flush worker quarantines the entry and moves on.
///
/// [`RelayError::Persistence`]: crate::error::RelayError::Persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist(&self, message: &Message) -> RelayResult<()>;
}
