//! Periodic drain of the durable queue into long-term storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::RelayResult;
use crate::message::Message;
use crate::queue::DurableQueue;
use crate::storage::MessageStore;

/// Default pause between drain cycles.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries whose outcome is settled (persisted or quarantined)
    pub attempted: usize,
    pub persisted: usize,
    pub quarantined: usize,
    /// Entries removed from the head of the queue. Lower than `attempted`
    /// when another drainer already removed part of the batch.
    pub trimmed: usize,
}

/// Drains the queue on a fixed interval.
///
/// A cycle peeks every pending entry, persists them one by one, quarantines
/// the ones that fail, then trims the entries it settled that are still at
/// the head of the queue. Entries appended while the cycle runs stay queued
/// for the next one, and several workers may share one queue: an entry is
/// only removed by a worker that settled an identical one.
#[derive(Clone)]
pub struct FlushWorker {
    queue: Arc<dyn DurableQueue>,
    store: Arc<dyn MessageStore>,
    interval: Duration,
}

impl FlushWorker {
    pub fn new(queue: Arc<dyn DurableQueue>, store: Arc<dyn MessageStore>, interval: Duration) -> Self {
        Self {
            queue,
            store,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one peek, persist, trim cycle.
    pub async fn drain_once(&self) -> RelayResult<DrainReport> {
        let batch = self.queue.peek_all().await?;
        if batch.is_empty() {
            debug!("no new messages");
            return Ok(DrainReport::default());
        }

        info!(count = batch.len(), "processing buffered messages");
        let mut report = DrainReport::default();

        for entry in &batch {
            match self.persist_entry(entry).await {
                Ok(()) => report.persisted += 1,
                Err(failure) => {
                    warn!(error = %failure, entry = %entry, "failed to persist message, quarantining");
                    if let Err(error) = self.queue.append_quarantine(entry).await {
                        // Without a quarantine copy the entry must stay queued,
                        // so the trim stops short of it.
                        error!(%error, "quarantine unavailable, ending cycle early");
                        break;
                    }
                    report.quarantined += 1;
                }
            }
            report.attempted += 1;
        }

        if report.attempted > 0 {
            match self.queue.trim_settled(&batch[..report.attempted]).await {
                Ok(trimmed) => report.trimmed = trimmed,
                Err(error) => {
                    warn!(
                        %error,
                        persisted = report.persisted,
                        quarantined = report.quarantined,
                        "trim failed, settled entries will be drained again"
                    );
                    return Err(error);
                }
            }
            if report.trimmed < report.attempted {
                debug!(
                    settled = report.attempted,
                    trimmed = report.trimmed,
                    "part of the batch was already removed by another drainer"
                );
            }
        }

        info!(
            persisted = report.persisted,
            quarantined = report.quarantined,
            trimmed = report.trimmed,
            "processed messages removed from queue"
        );
        Ok(report)
    }

    async fn persist_entry(&self, entry: &str) -> RelayResult<()> {
        let message = Message::from_entry(entry)?;
        self.store.persist(&message).await
    }

    /// Drain on every tick until `shutdown` flips to `true` or its sender is
    /// dropped. A cycle in progress always completes first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "flush worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.drain_once().await {
                        warn!(%error, "drain cycle skipped");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("flush worker stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
