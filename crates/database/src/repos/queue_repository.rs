//! Durable queue kept in SQLite, for deployments without Redis.

use async_trait::async_trait;
use roomcast_relay::queue::{settled_overlap, DEFAULT_QUARANTINE_KEY, DEFAULT_QUEUE_KEY};
use roomcast_relay::{DurableQueue, QueueEntry, RelayError, RelayResult};
use sqlx::SqlitePool;
use tracing::debug;

/// Queue backed by the `queue_entries` and `quarantine_entries` tables.
///
/// The autoincrement id is the queue position, so trimming the first `n`
/// rows of a list never touches rows inserted after the peek that counted
/// them. Settled trims compare the head rows inside a transaction and delete
/// by id, which keeps a `drain` run beside a live server from removing rows
/// the server has not stored. Several lists can share the tables through
/// their `list_key`.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    queue_key: String,
    quarantine_key: String,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_keys(pool, DEFAULT_QUEUE_KEY, DEFAULT_QUARANTINE_KEY)
    }

    pub fn with_keys(
        pool: SqlitePool,
        queue_key: impl Into<String>,
        quarantine_key: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            queue_key: queue_key.into(),
            quarantine_key: quarantine_key.into(),
        }
    }
}

fn queue_error(op: &str, error: sqlx::Error) -> RelayError {
    RelayError::queue(format!("{op} failed: {error}"))
}

#[async_trait]
impl DurableQueue for SqliteQueue {
    async fn append(&self, entry: &str) -> RelayResult<()> {
        sqlx::query("INSERT INTO queue_entries (list_key, payload, enqueued_at) VALUES (?, ?, ?)")
            .bind(&self.queue_key)
            .bind(entry)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| queue_error("append", e))?;
        Ok(())
    }

    async fn peek_all(&self) -> RelayResult<Vec<QueueEntry>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT payload FROM queue_entries WHERE list_key = ? ORDER BY id")
                .bind(&self.queue_key)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| queue_error("peek", e))?;
        Ok(rows.into_iter().map(|(payload,)| payload).collect())
    }

    async fn trim_first(&self, count: usize) -> RelayResult<()> {
        if count == 0 {
            return Ok(());
        }
        let limit = i64::try_from(count).unwrap_or(i64::MAX);

        let result = sqlx::query(
            "DELETE FROM queue_entries WHERE id IN (
                SELECT id FROM queue_entries WHERE list_key = ? ORDER BY id LIMIT ?
            )",
        )
        .bind(&self.queue_key)
        .bind(limit)
        .execute(&self.pool)
        .await
        .map_err(|e| queue_error("trim", e))?;

        debug!(requested = count, removed = result.rows_affected(), "trimmed queue");
        Ok(())
    }

    async fn trim_settled(&self, settled: &[QueueEntry]) -> RelayResult<usize> {
        if settled.is_empty() {
            return Ok(0);
        }
        let limit = i64::try_from(settled.len()).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await.map_err(|e| queue_error("trim", e))?;
        let head: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, payload FROM queue_entries WHERE list_key = ? ORDER BY id LIMIT ?",
        )
        .bind(&self.queue_key)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| queue_error("trim", e))?;

        let payloads: Vec<QueueEntry> = head.iter().map(|(_, payload)| payload.clone()).collect();
        let count = settled_overlap(settled, &payloads);
        if count > 0 {
            let last_id = head[count - 1].0;
            sqlx::query("DELETE FROM queue_entries WHERE list_key = ? AND id <= ?")
                .bind(&self.queue_key)
                .bind(last_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| queue_error("trim", e))?;
        }
        tx.commit().await.map_err(|e| queue_error("trim", e))?;

        debug!(settled = settled.len(), removed = count, "trimmed settled entries");
        Ok(count)
    }

    async fn append_quarantine(&self, entry: &str) -> RelayResult<()> {
        sqlx::query(
            "INSERT INTO quarantine_entries (list_key, payload, quarantined_at) VALUES (?, ?, ?)",
        )
        .bind(&self.quarantine_key)
        .bind(entry)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| queue_error("quarantine", e))?;
        Ok(())
    }

    async fn quarantined(&self) -> RelayResult<Vec<QueueEntry>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT payload FROM quarantine_entries WHERE list_key = ? ORDER BY id",
        )
        .bind(&self.quarantine_key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| queue_error("read quarantine", e))?;
        Ok(rows.into_iter().map(|(payload,)| payload).collect())
    }

    async fn len(&self) -> RelayResult<usize> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_entries WHERE list_key = ?")
                .bind(&self.queue_key)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| queue_error("count", e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_pool;

    #[tokio::test]
    async fn trim_removes_only_the_counted_prefix() {
        let (pool, _dir) = test_pool().await;
        let queue = SqliteQueue::new(pool);

        queue.append("a").await.unwrap();
        queue.append("b").await.unwrap();
        let batch = queue.peek_all().await.unwrap();
        queue.append("c").await.unwrap();
        queue.trim_first(batch.len()).await.unwrap();

        assert_eq!(batch, vec!["a", "b"]);
        assert_eq!(queue.peek_all().await.unwrap(), vec!["c"]);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn trim_beyond_length_empties_the_queue() {
        let (pool, _dir) = test_pool().await;
        let queue = SqliteQueue::new(pool);
        queue.append("a").await.unwrap();

        queue.trim_first(5).await.unwrap();
        queue.trim_first(0).await.unwrap();

        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn settled_trim_leaves_rows_another_drainer_already_removed() {
        let (pool, _dir) = test_pool().await;
        let server = SqliteQueue::new(pool.clone());
        let cli = SqliteQueue::new(pool);

        server.append("a").await.unwrap();
        server.append("b").await.unwrap();
        let stale = cli.peek_all().await.unwrap();

        let fresh = server.peek_all().await.unwrap();
        assert_eq!(server.trim_settled(&fresh).await.unwrap(), 2);
        server.append("c").await.unwrap();

        assert_eq!(cli.trim_settled(&stale).await.unwrap(), 0);
        assert_eq!(server.peek_all().await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn settled_trim_removes_the_remaining_overlap() {
        let (pool, _dir) = test_pool().await;
        let queue = SqliteQueue::new(pool);
        for entry in ["a", "b"] {
            queue.append(entry).await.unwrap();
        }
        let batch = queue.peek_all().await.unwrap();

        queue.trim_first(1).await.unwrap();
        queue.append("c").await.unwrap();

        assert_eq!(queue.trim_settled(&batch).await.unwrap(), 1);
        assert_eq!(queue.peek_all().await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn quarantine_is_separate_from_pending_entries() {
        let (pool, _dir) = test_pool().await;
        let queue = SqliteQueue::new(pool);

        queue.append("ok").await.unwrap();
        queue.append_quarantine("bad").await.unwrap();
        queue.append_quarantine("worse").await.unwrap();

        assert_eq!(queue.peek_all().await.unwrap(), vec!["ok"]);
        assert_eq!(queue.quarantined().await.unwrap(), vec!["bad", "worse"]);
    }

    #[tokio::test]
    async fn lists_with_different_keys_do_not_interfere() {
        let (pool, _dir) = test_pool().await;
        let first = SqliteQueue::with_keys(pool.clone(), "ROOMS_A", "FAILED_A");
        let second = SqliteQueue::with_keys(pool, "ROOMS_B", "FAILED_B");

        first.append("a1").await.unwrap();
        second.append("b1").await.unwrap();
        first.append("a2").await.unwrap();
        second.trim_first(10).await.unwrap();

        assert_eq!(first.peek_all().await.unwrap(), vec!["a1", "a2"]);
        assert!(second.is_empty().await.unwrap());
    }
}
