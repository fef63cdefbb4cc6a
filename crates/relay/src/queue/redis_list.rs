use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::{DurableQueue, QueueEntry, DEFAULT_QUARANTINE_KEY, DEFAULT_QUEUE_KEY};

/// Server-side version of `settled_overlap` followed by the matching `LTRIM`.
const TRIM_SETTLED_SCRIPT: &str = r#"
local n = #ARGV
local head = redis.call('LRANGE', KEYS[1], 0, n - 1)
for k = math.min(n, #head), 1, -1 do
  local matches = true
  for i = 1, k do
    if head[i] ~= ARGV[n - k + i] then
      matches = false
      break
    end
  end
  if matches then
    redis.call('LTRIM', KEYS[1], k, -1)
    return k
  end
end
return 0
"#;
use crate::error::{RelayError, RelayResult};

/// Queue stored in two Redis lists.
///
/// `RPUSH` appends, `LRANGE key 0 -1` peeks and `LTRIM key n -1` drops the
/// first `n` entries. Settled trims run as a Lua script so the head check and
/// the `LTRIM` cannot interleave with another instance draining the same list.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    queue_key: String,
    quarantine_key: String,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_keys(conn, DEFAULT_QUEUE_KEY, DEFAULT_QUARANTINE_KEY)
    }

    pub fn with_keys(
        conn: ConnectionManager,
        queue_key: impl Into<String>,
        quarantine_key: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            queue_key: queue_key.into(),
            quarantine_key: quarantine_key.into(),
        }
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub fn quarantine_key(&self) -> &str {
        &self.quarantine_key
    }
}

fn queue_error(op: &str, key: &str, error: redis::RedisError) -> RelayError {
    RelayError::queue(format!("{op} on {key} failed: {error}"))
}

#[async_trait]
impl DurableQueue for RedisQueue {
    async fn append(&self, entry: &str) -> RelayResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .rpush(&self.queue_key, entry)
            .await
            .map_err(|e| queue_error("RPUSH", &self.queue_key, e))?;
        Ok(())
    }

    async fn peek_all(&self) -> RelayResult<Vec<QueueEntry>> {
        let mut conn = self.conn.clone();
        conn.lrange(&self.queue_key, 0, -1)
            .await
            .map_err(|e| queue_error("LRANGE", &self.queue_key, e))
    }

    async fn trim_first(&self, count: usize) -> RelayResult<()> {
        if count == 0 {
            return Ok(());
        }

        let start = isize::try_from(count)
            .map_err(|_| RelayError::queue(format!("trim count {count} out of range")))?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .ltrim(&self.queue_key, start, -1)
            .await
            .map_err(|e| queue_error("LTRIM", &self.queue_key, e))?;

        debug!(key = %self.queue_key, count, "trimmed queue head");
        Ok(())
    }

    async fn trim_settled(&self, settled: &[QueueEntry]) -> RelayResult<usize> {
        if settled.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let removed: usize = redis::Script::new(TRIM_SETTLED_SCRIPT)
            .key(&self.queue_key)
            .arg(settled)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| queue_error("EVALSHA", &self.queue_key, e))?;

        debug!(key = %self.queue_key, settled = settled.len(), removed, "trimmed settled entries");
        Ok(removed)
    }

    async fn append_quarantine(&self, entry: &str) -> RelayResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .rpush(&self.quarantine_key, entry)
            .await
            .map_err(|e| queue_error("RPUSH", &self.quarantine_key, e))?;
        Ok(())
    }

    async fn quarantined(&self) -> RelayResult<Vec<QueueEntry>> {
        let mut conn = self.conn.clone();
        conn.lrange(&self.quarantine_key, 0, -1)
            .await
            .map_err(|e| queue_error("LRANGE", &self.quarantine_key, e))
    }

    async fn len(&self) -> RelayResult<usize> {
        let mut conn = self.conn.clone();
        conn.llen(&self.queue_key)
            .await
            .map_err(|e| queue_error("LLEN", &self.queue_key, e))
    }
}
