pub mod codec;
pub mod record;

pub use codec::{decode_json, encode_json, encode_submission, CodecError};
pub use record::{
    ArtifactKind, FlushReport, KycRecord, KycSubmission, RecordId, RecordStatus, StorageStats,
    SubmissionId, SyncQueueEntry, UnknownArtifactKind, DEFAULT_MAX_ATTEMPTS,
};
