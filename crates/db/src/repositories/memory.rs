use std::collections::HashMap;

use tokio::sync::RwLock;

use chavruta_core::domain::user::{UserId, UserRecord};

use super::{RepositoryError, UserRepository};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, UserRecord>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn save(&self, record: UserRecord) -> Result<UserId, RepositoryError> {
        let mut users = self.users.write().await;
        let id = record.id.clone();
        users.insert(id.0.clone(), record);
        Ok(id)
    }
}
