use kycsync_contract::CodecError;
use kycsync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local persistence failed: {0}")]
    Persistence(#[from] StorageError),
    #[error("stored KYC state is unreadable: {0}")]
    Serialization(#[from] CodecError),
    #[error("failed to clear stores: {}", keys.join(", "))]
    ClearIncomplete { keys: Vec<String> },
}
