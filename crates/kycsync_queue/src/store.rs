use std::collections::BTreeMap;
use std::sync::Arc;

use kycsync_contract::{decode_json, encode_json, KycRecord, RecordId, SyncQueueEntry};
use kycsync_storage::KvStore;

use crate::error::SyncError;

pub(crate) const RECORDS_KEY: &str = "kycData";
pub(crate) const QUEUE_KEY: &str = "syncQueue";

pub(crate) type RecordMap = BTreeMap<RecordId, KycRecord>;

#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub records: RecordMap,
    pub queue: Vec<SyncQueueEntry>,
    /// Length of the persisted text of both collections.
    pub bytes: usize,
}

/// Typed view of the two persisted collections. Every write replaces a whole
/// collection; callers serialize read-modify-write cycles themselves.
#[derive(Clone)]
pub(crate) struct KycStore {
    kv: Arc<dyn KvStore>,
}

impl KycStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn load(&self) -> Result<Snapshot, SyncError> {
        let raw_records = self.kv.get(RECORDS_KEY).await?;
        let raw_queue = self.kv.get(QUEUE_KEY).await?;

        let bytes = raw_records.as_ref().map_or(0, String::len) + raw_queue.as_ref().map_or(0, String::len);
        let records = match raw_records {
            Some(raw) => decode_json(&raw)?,
            None => RecordMap::new(),
        };
        let queue = match raw_queue {
            Some(raw) => decode_json(&raw)?,
            None => Vec::new(),
        };

        Ok(Snapshot {
            records,
            queue,
            bytes,
        })
    }

    pub async fn load_queue(&self) -> Result<Vec<SyncQueueEntry>, SyncError> {
        match self.kv.get(QUEUE_KEY).await? {
            Some(raw) => Ok(decode_json(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Writes both collections in one atomic store call.
    pub async fn save(&self, records: &RecordMap, queue: &[SyncQueueEntry]) -> Result<(), SyncError> {
        let records_json = encode_json(records)?;
        let queue_json = encode_json(&queue)?;
        self.kv
            .set_many(&[(RECORDS_KEY, &records_json), (QUEUE_KEY, &queue_json)])
            .await?;
        Ok(())
    }

    pub async fn save_queue(&self, queue: &[SyncQueueEntry]) -> Result<(), SyncError> {
        let queue_json = encode_json(&queue)?;
        self.kv.set(QUEUE_KEY, &queue_json).await?;
        Ok(())
    }

    /// Tries every key, returning the ones that could not be removed.
    pub async fn wipe(&self) -> Vec<(&'static str, SyncError)> {
        let mut failures = Vec::new();
        for key in [RECORDS_KEY, QUEUE_KEY] {
            if let Err(err) = self.kv.remove(key).await {
                failures.push((key, SyncError::from(err)));
            }
        }
        failures
    }
}
