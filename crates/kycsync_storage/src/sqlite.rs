use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;

use crate::kv::{KvStore, StorageError};

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");
const MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Filesystem path or `sqlite:` URI.
    pub sqlite_path: String,
}

impl StorageConfig {
    fn connect_uri(&self) -> String {
        if self.sqlite_path.starts_with("sqlite:") {
            self.sqlite_path.clone()
        } else {
            format!("sqlite://{}", self.sqlite_path)
        }
    }

    /// The database file is created on first use.
    pub fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let uri = self.connect_uri();
        Ok(SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {uri}"))?
            .create_if_missing(true))
    }
}

#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(config.connect_options()?)
            .await
            .with_context(|| format!("failed to open kv store at {}", config.sqlite_path))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent; safe on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("failed to create kv_entries table")?;
        debug!("kv_entries schema ready");
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| StorageError::sqlite(format!("read key {key}"), source))
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| StorageError::sqlite("begin kv transaction", source))?;

        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO kv_entries(key, value, updated_at) VALUES (?, ?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(*key)
            .bind(*value)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|source| StorageError::sqlite(format!("write key {key}"), source))?;
        }

        tx.commit()
            .await
            .map_err(|source| StorageError::sqlite("commit kv transaction", source))?;
        debug!(keys = entries.len(), "kv entries written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|source| StorageError::sqlite(format!("delete key {key}"), source))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &tempfile::TempDir) -> SqliteKvStore {
        let path = dir.path().join("kyc.sqlite");
        SqliteKvStore::connect(&StorageConfig {
            sqlite_path: path.display().to_string(),
        })
        .await
        .expect("connect")
    }

    fn config(path: &str) -> StorageConfig {
        StorageConfig {
            sqlite_path: path.to_string(),
        }
    }

    #[test]
    fn bare_paths_gain_sqlite_scheme() {
        assert_eq!(config("data/kyc.sqlite").connect_uri(), "sqlite://data/kyc.sqlite");
        assert_eq!(config("sqlite::memory:").connect_uri(), "sqlite::memory:");
        assert!(config("sqlite::memory:").connect_options().is_ok());
    }

    #[tokio::test]
    async fn set_many_writes_and_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir).await;

        store
            .set_many(&[("kycData", "{}"), ("syncQueue", "[]")])
            .await
            .expect("write");
        store.set("syncQueue", "[1]").await.expect("overwrite");

        assert_eq!(store.get("kycData").await.expect("read").as_deref(), Some("{}"));
        assert_eq!(store.get("syncQueue").await.expect("read").as_deref(), Some("[1]"));
        assert!(store.get("missing").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir).await;

        store.set("kycData", "{}").await.expect("write");
        store.remove("kycData").await.expect("remove");
        store.remove("kycData").await.expect("remove again");

        assert!(store.get("kycData").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn data_survives_reconnect() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = open(&dir).await;
            store.set("kycData", r#"{"a":1}"#).await.expect("write");
            store.pool().close().await;
        }

        let reopened = open(&dir).await;
        assert_eq!(
            reopened.get("kycData").await.expect("read").as_deref(),
            Some(r#"{"a":1}"#)
        );
    }
}
