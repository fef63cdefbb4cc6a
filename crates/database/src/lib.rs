//! Roomcast Database Crate
//!
//! SQLite storage for the relay: connection management, migrations, the
//! [`CommentRepository`] the flush worker persists into, and the
//! [`SqliteQueue`] used as the durable queue when no Redis is configured.

use roomcast_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use entities::StoredComment;
pub use migrations::run_migrations;
pub use repos::{CommentRepository, SqliteQueue};
pub use types::{DatabaseError, DatabaseResult};

/// Open the pool and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
