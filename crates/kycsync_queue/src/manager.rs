use std::sync::Arc;

use kycsync_contract::{
    ArtifactKind, FlushReport, KycRecord, KycSubmission, RecordId, RecordStatus, StorageStats,
    SyncQueueEntry,
};
use kycsync_delivery::{ConnectivityProbe, DeliveryBridge, DeliveryError};
use kycsync_storage::KvStore;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backoff::backoff_delay;
use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Ids};
use crate::config::QueueConfig;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::store::{KycStore, Snapshot};

#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn KvStore>,
    pub delivery: Arc<dyn DeliveryBridge>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl Collaborators {
    pub fn new(
        store: Arc<dyn KvStore>,
        delivery: Arc<dyn DeliveryBridge>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            store,
            delivery,
            connectivity,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Ids),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Synced,
    StillPending,
    FailedTerminal,
    /// The entry disappeared before it could be attempted or settled.
    Skipped,
}

/// Sole owner of the KYC record store and its delivery queue.
///
/// Cloning is cheap and every clone shares the same stores, locks and event
/// bus. Two locks are involved: `flush_lock` keeps at most one flush in
/// flight, `state_lock` serializes each read-modify-write of the stores and is
/// never held across a backoff wait or a delivery call.
#[derive(Clone)]
pub struct SyncQueueManager {
    store: KycStore,
    delivery: Arc<dyn DeliveryBridge>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: QueueConfig,
    flush_lock: Arc<Mutex<()>>,
    state_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncQueueManager {
    pub fn new(collaborators: Collaborators, config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store: KycStore::new(collaborators.store),
            delivery: collaborators.delivery,
            connectivity: collaborators.connectivity,
            clock: collaborators.clock,
            ids: collaborators.ids,
            config,
            flush_lock: Arc::new(Mutex::new(())),
            state_lock: Arc::new(Mutex::new(())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Persists a new artifact together with its queue entry and returns its id.
    ///
    /// Delivery has not happened when this returns. With `flush_on_record`
    /// set, a flush is spawned in the background.
    pub async fn record_artifact(
        &self,
        kind: ArtifactKind,
        payload: Value,
    ) -> Result<RecordId, SyncError> {
        let record_id = {
            let _state = self.state_lock.lock().await;
            let mut snapshot = self.store.load().await?;

            let now = self.clock.now();
            let record = KycRecord::new(self.ids.new_id(), kind, payload, now);
            let entry = SyncQueueEntry::for_record(&record, self.config.max_attempts, now);
            let record_id = record.id.clone();

            snapshot.records.insert(record_id.clone(), record);
            snapshot.queue.push(entry);
            self.store.save(&snapshot.records, &snapshot.queue).await?;
            record_id
        };

        info!(record_id = %record_id, kind = %kind, "kyc artifact recorded");
        self.emit(SyncEvent::Recorded {
            record_id: record_id.clone(),
            kind,
        });

        if self.config.flush_on_record {
            self.spawn_flush();
        }

        Ok(record_id)
    }

    /// Fire-and-forget flush. The handle may be dropped.
    pub fn spawn_flush(&self) -> JoinHandle<FlushReport> {
        let manager = self.clone();
        tokio::spawn(async move { manager.flush().await })
    }

    /// One delivery pass over every eligible entry, oldest first.
    ///
    /// Never fails: delivery outcomes are folded into record state and the
    /// returned report, storage failures are logged.
    pub async fn flush(&self) -> FlushReport {
        let Ok(_flight) = self.flush_lock.try_lock() else {
            debug!("flush already in flight, skipping");
            return FlushReport::skipped();
        };

        if !self.connectivity.is_connected().await {
            let pending = match self.store.load_queue().await {
                Ok(queue) => queue.iter().filter(|entry| entry.is_eligible()).count(),
                Err(err) => {
                    error!(error = %err, "failed to read sync queue");
                    0
                }
            };
            info!(pending, "no connectivity, sync deferred");
            self.emit(SyncEvent::Deferred { pending });
            return FlushReport::deferred(pending);
        }

        let mut report = FlushReport::default();
        match self.fail_exhausted().await {
            Ok(failed) => report.failed_terminal = failed,
            Err(err) => error!(error = %err, "failed to settle exhausted entries"),
        }

        let entries: Vec<SyncQueueEntry> = match self.store.load_queue().await {
            Ok(queue) => queue.into_iter().filter(SyncQueueEntry::is_eligible).collect(),
            Err(err) => {
                error!(error = %err, "failed to read sync queue");
                return report;
            }
        };

        if entries.is_empty() {
            debug!("no pending items to sync");
            return report;
        }

        info!(items = entries.len(), "syncing queued kyc artifacts");
        for entry in entries {
            match self.attempt(&entry).await {
                Ok(AttemptOutcome::Synced) => report.synced += 1,
                Ok(AttemptOutcome::StillPending) => report.still_pending += 1,
                Ok(AttemptOutcome::FailedTerminal) => report.failed_terminal += 1,
                Ok(AttemptOutcome::Skipped) => {}
                Err(err) => {
                    error!(record_id = %entry.record_id, error = %err, "sync attempt aborted");
                    report.still_pending += 1;
                }
            }
        }

        info!(
            synced = report.synced,
            still_pending = report.still_pending,
            failed_terminal = report.failed_terminal,
            "flush finished"
        );
        report
    }

    /// Entries whose final attempt never settled (process killed mid-delivery,
    /// task aborted, or the settling write failed) become terminal failures.
    async fn fail_exhausted(&self) -> Result<usize, SyncError> {
        let exhausted = {
            let _state = self.state_lock.lock().await;
            let mut snapshot = self.store.load().await?;

            let (exhausted, remaining): (Vec<SyncQueueEntry>, Vec<SyncQueueEntry>) =
                snapshot.queue.into_iter().partition(SyncQueueEntry::is_exhausted);
            if exhausted.is_empty() {
                return Ok(0);
            }

            let now = self.clock.now();
            for entry in &exhausted {
                if let Some(record) = snapshot.records.get_mut(&entry.record_id) {
                    record.mark_failed(now);
                }
            }
            self.store.save(&snapshot.records, &remaining).await?;
            exhausted
        };

        for entry in &exhausted {
            warn!(
                record_id = %entry.record_id,
                attempts = entry.attempts,
                "final attempt never settled, marking failed"
            );
            self.emit(SyncEvent::FailedTerminal {
                record_id: entry.record_id.clone(),
                kind: entry.record_kind,
                attempts: entry.attempts,
                reason: "final attempt did not complete".to_string(),
            });
        }
        Ok(exhausted.len())
    }

    async fn attempt(&self, entry: &SyncQueueEntry) -> Result<AttemptOutcome, SyncError> {
        let Some((record, attempts, max_attempts)) = self.begin_attempt(&entry.record_id).await?
        else {
            return Ok(AttemptOutcome::Skipped);
        };

        tokio::time::sleep(backoff_delay(
            attempts,
            self.config.backoff_base,
            self.config.backoff_cap,
        ))
        .await;

        let submission = KycSubmission::for_attempt(
            Uuid::now_v7().to_string(),
            &record,
            attempts,
            self.clock.now(),
        );
        let deadline = self.config.delivery_timeout;
        let result = match tokio::time::timeout(deadline, self.delivery.send(&submission)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(deadline)),
        };

        match result {
            Ok(receipt) => {
                debug!(submission_id = %receipt.submission_id, "delivery acknowledged");
                self.settle(&record, attempts, RecordStatus::Synced, None)
                    .await
            }
            Err(err) if attempts < max_attempts => {
                warn!(
                    record_id = %record.id,
                    kind = %record.kind,
                    attempts,
                    error = %err,
                    "sync attempt failed, will retry"
                );
                self.emit(SyncEvent::AttemptFailed {
                    record_id: record.id.clone(),
                    kind: record.kind,
                    attempts,
                    reason: err.to_string(),
                });
                Ok(AttemptOutcome::StillPending)
            }
            Err(err) => {
                error!(
                    record_id = %record.id,
                    kind = %record.kind,
                    attempts,
                    error = %err,
                    "max attempts reached"
                );
                self.settle(&record, attempts, RecordStatus::SyncFailed, Some(err.to_string()))
                    .await
            }
        }
    }

    /// Counts the attempt durably before any delivery is made.
    async fn begin_attempt(
        &self,
        record_id: &str,
    ) -> Result<Option<(KycRecord, u32, u32)>, SyncError> {
        let _state = self.state_lock.lock().await;
        let mut snapshot = self.store.load().await?;

        let Some(pos) = snapshot
            .queue
            .iter()
            .position(|entry| entry.record_id == record_id)
        else {
            return Ok(None);
        };
        if !snapshot.queue[pos].is_eligible() {
            return Ok(None);
        }

        let Some(record) = snapshot.records.get(record_id).cloned() else {
            warn!(record_id = %record_id, "queue entry without record, dropping");
            snapshot.queue.remove(pos);
            self.store.save_queue(&snapshot.queue).await?;
            return Ok(None);
        };

        let entry = &mut snapshot.queue[pos];
        entry.attempts += 1;
        let (attempts, max_attempts) = (entry.attempts, entry.max_attempts);
        self.store.save_queue(&snapshot.queue).await?;
        Ok(Some((record, attempts, max_attempts)))
    }

    /// Moves a record to a terminal status and drops its queue entry.
    async fn settle(
        &self,
        record: &KycRecord,
        attempts: u32,
        status: RecordStatus,
        reason: Option<String>,
    ) -> Result<AttemptOutcome, SyncError> {
        {
            let _state = self.state_lock.lock().await;
            let mut snapshot = self.store.load().await?;

            let before = snapshot.queue.len();
            snapshot.queue.retain(|entry| entry.record_id != record.id);
            let Some(stored) = snapshot.records.get_mut(&record.id) else {
                debug!(record_id = %record.id, "record cleared during delivery");
                return Ok(AttemptOutcome::Skipped);
            };
            if before == snapshot.queue.len() {
                debug!(record_id = %record.id, "queue entry cleared during delivery");
                return Ok(AttemptOutcome::Skipped);
            }

            let now = self.clock.now();
            match status {
                RecordStatus::Synced => stored.mark_synced(now),
                _ => stored.mark_failed(now),
            }
            self.store.save(&snapshot.records, &snapshot.queue).await?;
        }

        let record_id = record.id.clone();
        let kind = record.kind;
        if status == RecordStatus::Synced {
            info!(record_id = %record_id, kind = %kind, attempts, "kyc artifact synced");
            self.emit(SyncEvent::Synced {
                record_id,
                kind,
                attempts,
            });
            Ok(AttemptOutcome::Synced)
        } else {
            self.emit(SyncEvent::FailedTerminal {
                record_id,
                kind,
                attempts,
                reason: reason.unwrap_or_default(),
            });
            Ok(AttemptOutcome::FailedTerminal)
        }
    }

    /// Both collections as of one point between state writes.
    async fn snapshot(&self) -> Result<Snapshot, SyncError> {
        let _state = self.state_lock.lock().await;
        self.store.load().await
    }

    /// Exhausted entries not yet settled by a flush already count as failed.
    pub async fn status(&self) -> Result<StorageStats, SyncError> {
        let snapshot = self.snapshot().await?;
        let count = |status: RecordStatus| {
            snapshot
                .records
                .values()
                .filter(|record| record.status == status)
                .count()
        };

        Ok(StorageStats {
            total_records: snapshot.records.len(),
            pending_sync: snapshot.queue.iter().filter(|entry| entry.is_eligible()).count(),
            failed_sync: count(RecordStatus::SyncFailed)
                + snapshot.queue.iter().filter(|entry| entry.is_exhausted()).count(),
            synced: count(RecordStatus::Synced),
            storage_bytes: snapshot.bytes,
        })
    }

    pub async fn record(&self, record_id: &str) -> Result<Option<KycRecord>, SyncError> {
        Ok(self.snapshot().await?.records.remove(record_id))
    }

    /// All records, oldest first.
    pub async fn records(&self) -> Result<Vec<KycRecord>, SyncError> {
        let mut records: Vec<KycRecord> = self.snapshot().await?.records.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Most recently captured record of `kind`.
    pub async fn latest_record(&self, kind: ArtifactKind) -> Result<Option<KycRecord>, SyncError> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .filter(|record| record.kind == kind)
            .last())
    }

    pub async fn pending_entries(&self) -> Result<Vec<SyncQueueEntry>, SyncError> {
        Ok(self.store.load_queue().await?)
    }

    /// Removes both stores. Each removal is attempted even if the other fails.
    pub async fn clear_all(&self) -> Result<(), SyncError> {
        let failures = {
            let _state = self.state_lock.lock().await;
            self.store.wipe().await
        };

        if failures.is_empty() {
            info!("all kyc data cleared");
            self.emit(SyncEvent::Cleared);
            return Ok(());
        }

        for (key, err) in &failures {
            error!(key = %key, error = %err, "failed to clear store");
        }
        Err(SyncError::ClearIncomplete {
            keys: failures.into_iter().map(|(key, _)| key.to_string()).collect(),
        })
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}
