pub mod kv;
pub mod memory;
pub mod sqlite;

pub use kv::{KvStore, StorageError};
pub use memory::InMemoryKvStore;
pub use sqlite::{SqliteKvStore, StorageConfig};
