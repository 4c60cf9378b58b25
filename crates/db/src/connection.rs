use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Opens the user store, creating the database file on first run.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::{connect, connect_with_settings};

    #[tokio::test]
    async fn creates_a_missing_database_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("fresh.db");

        let pool = connect(&format!("sqlite://{}", path.display())).await.expect("connect");
        let (busy,): (i64,) =
            sqlx::query_as("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        assert_eq!(busy, 5000);
        assert!(path.exists());

        pool.close().await;
    }

    #[tokio::test]
    async fn rejects_urls_that_are_not_sqlite() {
        assert!(connect_with_settings("postgres://localhost/chavruta", 1, 1).await.is_err());
    }
}
