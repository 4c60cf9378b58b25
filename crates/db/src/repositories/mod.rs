use async_trait::async_trait;
use thiserror::Error;

use chavruta_core::domain::user::{UserId, UserRecord};

pub mod memory;
pub mod user;

pub use memory::InMemoryUserRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Per-user storage for the bot. `save` upserts by id.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>, RepositoryError>;
    async fn save(&self, record: UserRecord) -> Result<UserId, RepositoryError>;
}
