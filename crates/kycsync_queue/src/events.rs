use kycsync_contract::{ArtifactKind, RecordId};
use serde::{Deserialize, Serialize};

/// Progress notifications for display collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Recorded {
        record_id: RecordId,
        kind: ArtifactKind,
    },
    Deferred {
        pending: usize,
    },
    Synced {
        record_id: RecordId,
        kind: ArtifactKind,
        attempts: u32,
    },
    AttemptFailed {
        record_id: RecordId,
        kind: ArtifactKind,
        attempts: u32,
        reason: String,
    },
    FailedTerminal {
        record_id: RecordId,
        kind: ArtifactKind,
        attempts: u32,
        reason: String,
    },
    Cleared,
}
