use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kycsync_contract::{encode_submission, KycSubmission, RecordId, SubmissionId};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub submission_id: SubmissionId,
    pub record_id: RecordId,
    pub accepted_at: String,
    pub encoded_bytes: usize,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),
}

/// Remote KYC ingestion. Implementations report every outcome through the
/// returned `Result`; the queue treats any `Err` as one failed attempt.
#[async_trait]
pub trait DeliveryBridge: Send + Sync {
    async fn send(&self, submission: &KycSubmission) -> Result<DeliveryReceipt, DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Accept,
    Reject(String),
    /// Never resolves.
    Hang,
}

/// Deterministic backend. Outcomes are taken from the script in order, then
/// the fallback applies to every later call.
#[derive(Debug)]
pub struct InMemoryDeliveryBridge {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    fallback: ScriptedOutcome,
    accepted: Mutex<Vec<KycSubmission>>,
    calls: AtomicUsize,
}

impl InMemoryDeliveryBridge {
    pub fn new(fallback: ScriptedOutcome) -> Self {
        Self::with_script(Vec::new(), fallback)
    }

    pub fn accepting() -> Self {
        Self::new(ScriptedOutcome::Accept)
    }

    pub fn rejecting(reason: &str) -> Self {
        Self::new(ScriptedOutcome::Reject(reason.to_string()))
    }

    pub fn with_script(script: Vec<ScriptedOutcome>, fallback: ScriptedOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            accepted: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn accepted(&self) -> Vec<KycSubmission> {
        self.accepted.lock().await.clone()
    }

    async fn next_outcome(&self) -> ScriptedOutcome {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl DeliveryBridge for InMemoryDeliveryBridge {
    async fn send(&self, submission: &KycSubmission) -> Result<DeliveryReceipt, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if submission.payload == Value::Null {
            return Err(DeliveryError::InvalidSubmission(
                "payload cannot be null".to_string(),
            ));
        }

        match self.next_outcome().await {
            ScriptedOutcome::Accept => {
                let bytes = encode_submission(submission)
                    .map_err(|err| DeliveryError::InvalidSubmission(err.to_string()))?;
                info!(
                    record_id = %submission.record_id,
                    kind = %submission.kind,
                    attempt = submission.attempt,
                    bytes = bytes.len(),
                    "submission accepted"
                );
                self.accepted.lock().await.push(submission.clone());
                Ok(DeliveryReceipt {
                    submission_id: submission.submission_id.clone(),
                    record_id: submission.record_id.clone(),
                    accepted_at: Utc::now().to_rfc3339(),
                    encoded_bytes: bytes.len(),
                })
            }
            ScriptedOutcome::Reject(reason) => {
                warn!(
                    record_id = %submission.record_id,
                    attempt = submission.attempt,
                    reason = %reason,
                    "submission rejected"
                );
                Err(DeliveryError::Rejected(reason))
            }
            ScriptedOutcome::Hang => std::future::pending().await,
        }
    }
}
