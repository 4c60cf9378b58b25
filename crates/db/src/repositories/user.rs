use chrono::Utc;
use sqlx::Row;

use chavruta_core::domain::user::{UserId, UserRecord};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: Option<String> =
        row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(UserRecord { id: UserId(id), name })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query("SELECT id, name FROM users WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: UserRecord) -> Result<UserId, RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, name, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 updated_at = excluded.updated_at",
        )
        .bind(&record.id.0)
        .bind(&record.name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use chavruta_core::domain::user::{UserId, UserRecord};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlUserRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlUserRepository::new(pool)
    }

    #[tokio::test]
    async fn save_then_get_returns_record() {
        let repo = repo().await;
        let record = UserRecord::new("U1").with_name("Ari");

        let id = repo.save(record.clone()).await.expect("save");

        assert_eq!(id, UserId::from("U1"));
        assert_eq!(repo.get(&id).await.expect("get"), Some(record));
    }

    #[tokio::test]
    async fn save_overwrites_existing_nickname() {
        let repo = repo().await;
        repo.save(UserRecord::new("U1").with_name("Ari")).await.expect("first save");
        repo.save(UserRecord::new("U1").with_name("Dana")).await.expect("second save");

        let found = repo.get(&UserId::from("U1")).await.expect("get");
        assert_eq!(found.and_then(|record| record.name), Some("Dana".to_owned()));
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let repo = repo().await;
        assert_eq!(repo.get(&UserId::from("U404")).await.expect("get"), None);
    }
}
