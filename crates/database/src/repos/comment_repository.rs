//! Repository for persisted room messages.

use async_trait::async_trait;
use roomcast_relay::{Message, MessageStore, RelayResult};
use sqlx::SqlitePool;
use tracing::debug;

use crate::entities::StoredComment;
use crate::types::{DatabaseError, DatabaseResult};

/// Writes drained messages to the `comments` table.
#[derive(Clone)]
pub struct CommentRepository {
    pool: SqlitePool,
}

impl CommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one message and return the stored row.
    pub async fn create(&self, message: &Message) -> DatabaseResult<StoredComment> {
        if message.room_id.trim().is_empty() {
            return Err(DatabaseError::ValidationError(
                "comment requires a room id".to_string(),
            ));
        }

        let public_id = cuid2::cuid();
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO comments (public_id, room_id, text, sender_id, sender_name, sender_avatar, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(&message.room_id)
        .bind(&message.text)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(&message.sender_avatar)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(comment_id = id, room_id = %message.room_id, "stored comment");

        Ok(StoredComment {
            id,
            public_id,
            room_id: message.room_id.clone(),
            text: message.text.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            sender_avatar: message.sender_avatar.clone(),
            created_at: now,
        })
    }

    /// Most recent comments of a room, oldest first.
    pub async fn find_by_room(&self, room_id: &str, limit: i64) -> DatabaseResult<Vec<StoredComment>> {
        let mut rows = sqlx::query_as::<_, StoredComment>(
            "SELECT id, public_id, room_id, text, sender_id, sender_name, sender_avatar, created_at
             FROM comments WHERE room_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        Ok(rows)
    }

    pub async fn count(&self) -> DatabaseResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessageStore for CommentRepository {
    async fn persist(&self, message: &Message) -> RelayResult<()> {
        self.create(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_pool;
    use roomcast_relay::RelayError;

    fn message(room: &str, text: &str) -> Message {
        Message::new(room, text, "u-1", "Ada", "").unwrap()
    }

    #[tokio::test]
    async fn persist_writes_a_row_per_message() {
        let (pool, _dir) = test_pool().await;
        let repo = CommentRepository::new(pool);

        repo.persist(&message("Q1", "hi")).await.unwrap();
        repo.persist(&message("Q1", "hi")).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn find_by_room_returns_latest_in_posting_order() {
        let (pool, _dir) = test_pool().await;
        let repo = CommentRepository::new(pool);
        for text in ["one", "two", "three"] {
            repo.create(&message("Q1", text)).await.unwrap();
        }
        repo.create(&message("Q2", "elsewhere")).await.unwrap();

        let rows = repo.find_by_room("Q1", 2).await.unwrap();
        let texts: Vec<&str> = rows.iter().map(|row| row.text.as_str()).collect();

        assert_eq!(texts, vec!["two", "three"]);
        assert_eq!(rows[0].to_message(), message("Q1", "two"));
        assert_ne!(rows[0].public_id, rows[1].public_id);
    }

    #[tokio::test]
    async fn blank_room_is_a_persistence_failure() {
        let (pool, _dir) = test_pool().await;
        let repo = CommentRepository::new(pool);
        let blank = Message {
            room_id: " ".into(),
            text: "x".into(),
            sender_id: "u".into(),
            sender_name: "n".into(),
            sender_avatar: String::new(),
        };

        let err = repo.persist(&blank).await.unwrap_err();

        assert!(matches!(err, RelayError::Persistence(_)));
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
