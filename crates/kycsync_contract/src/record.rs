use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type RecordId = String;
pub type SubmissionId = String;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    Document,
    FaceAuth,
    DigilockerDocument,
    UserProfile,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Document,
        ArtifactKind::FaceAuth,
        ArtifactKind::DigilockerDocument,
        ArtifactKind::UserProfile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Document => "document",
            ArtifactKind::FaceAuth => "faceAuth",
            ArtifactKind::DigilockerDocument => "digilockerDocument",
            ArtifactKind::UserProfile => "userProfile",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown artifact kind: {0}")]
pub struct UnknownArtifactKind(pub String);

impl FromStr for ArtifactKind {
    type Err = UnknownArtifactKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| UnknownArtifactKind(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    PendingSync,
    Synced,
    SyncFailed,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordStatus::PendingSync)
    }
}

/// One captured artifact. `status` and the terminal timestamps belong to the
/// queue manager; every other field is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KycRecord {
    pub id: RecordId,
    pub kind: ArtifactKind,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl KycRecord {
    pub fn new(id: RecordId, kind: ArtifactKind, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            payload,
            created_at,
            status: RecordStatus::PendingSync,
            synced_at: None,
            failed_at: None,
        }
    }

    /// No-op once the record is terminal.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RecordStatus::Synced;
        self.synced_at = Some(at);
    }

    /// No-op once the record is terminal.
    pub fn mark_failed(&mut self, at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RecordStatus::SyncFailed;
        self.failed_at = Some(at);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncQueueEntry {
    pub record_kind: ArtifactKind,
    pub record_id: RecordId,
    pub attempts: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncQueueEntry {
    pub fn for_record(record: &KycRecord, max_attempts: u32, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            record_kind: record.kind,
            record_id: record.id.clone(),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            enqueued_at,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlushReport {
    pub synced: usize,
    pub still_pending: usize,
    pub failed_terminal: usize,
    pub deferred_no_connectivity: usize,
    /// Set when another flush held the queue and this call did nothing.
    #[serde(default)]
    pub already_running: bool,
}

impl FlushReport {
    pub fn deferred(pending: usize) -> Self {
        Self {
            deferred_no_connectivity: pending,
            ..Self::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            already_running: true,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.synced + self.still_pending + self.failed_terminal
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageStats {
    pub total_records: usize,
    pub pending_sync: usize,
    pub failed_sync: usize,
    pub synced: usize,
    pub storage_bytes: usize,
}

/// What the delivery collaborator receives for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycSubmission {
    pub submission_id: SubmissionId,
    pub record_id: RecordId,
    pub kind: ArtifactKind,
    pub payload: Value,
    pub captured_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
    pub attempt: u32,
    pub content_type: String,
}

impl KycSubmission {
    pub fn for_attempt(
        submission_id: SubmissionId,
        record: &KycRecord,
        attempt: u32,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            submission_id,
            record_id: record.id.clone(),
            kind: record.kind,
            payload: record.payload.clone(),
            captured_at: record.created_at,
            sent_at,
            attempt,
            content_type: "application/msgpack".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> KycRecord {
        KycRecord::new(
            "rec-1".to_string(),
            ArtifactKind::FaceAuth,
            json!({"confidence": 91}),
            Utc::now(),
        )
    }

    #[test]
    fn kind_parses_wire_names_case_insensitively() {
        assert_eq!("faceAuth".parse::<ArtifactKind>(), Ok(ArtifactKind::FaceAuth));
        assert_eq!(
            "DIGILOCKERDOCUMENT".parse::<ArtifactKind>(),
            Ok(ArtifactKind::DigilockerDocument)
        );
        assert!("passport".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn kind_serializes_camel_case() {
        let encoded = serde_json::to_string(&ArtifactKind::DigilockerDocument).expect("encode");
        assert_eq!(encoded, "\"digilockerDocument\"");
    }

    #[test]
    fn terminal_status_is_sticky() {
        let mut rec = record();
        let first = Utc::now();
        rec.mark_synced(first);
        rec.mark_failed(Utc::now());

        assert_eq!(rec.status, RecordStatus::Synced);
        assert_eq!(rec.synced_at, Some(first));
        assert!(rec.failed_at.is_none());
    }

    #[test]
    fn entry_eligibility_tracks_attempts() {
        let mut entry = SyncQueueEntry::for_record(&record(), 2, Utc::now());
        assert!(entry.is_eligible());
        entry.attempts = 2;
        assert!(!entry.is_eligible());
        assert!(entry.is_exhausted());
    }

    #[test]
    fn pending_record_omits_terminal_timestamps() {
        let value = serde_json::to_value(record()).expect("encode");
        assert_eq!(value["status"], "pending_sync");
        assert!(value.get("synced_at").is_none());
        assert!(value.get("failed_at").is_none());
    }
}
