use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{context}: {source}")]
    Sqlite {
        context: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn sqlite(context: impl Into<String>, source: sqlx::Error) -> Self {
        StorageError::Sqlite {
            context: context.into(),
            source,
        }
    }
}

/// Flat string key-value storage, the local persistence the queue writes through.
///
/// `set_many` must be all-or-nothing: either every key is written or none is.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key, value)]).await
    }
}
