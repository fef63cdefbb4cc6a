pub mod comment_repository;
pub mod queue_repository;

pub use comment_repository::CommentRepository;
pub use queue_repository::SqliteQueue;
