use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, WorkerError};
use crate::ledger::client::{extract_tx_hash, LedgerClient};

/// Lowercase hex SHA-256 of a workload's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commitment(String);

impl Commitment {
    /// Hash `output` exactly as given. No normalization happens here.
    pub fn of(output: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(output)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Argument form expected by `submitResult` (a managed buffer).
    pub fn to_argument(&self) -> String {
        format!("str:{}", self.0)
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that a result was accepted for broadcast by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub task_id: u64,
    pub tx_hash: String,
    pub commitment: Commitment,
    pub submitted_at: DateTime<Utc>,
}

/// Hashes results and submits the commitment through the ledger client.
///
/// Does not deduplicate: two `commit` calls for one task are two
/// transactions.
#[derive(Clone)]
pub struct ResultCommitter {
    ledger: Arc<dyn LedgerClient>,
}

impl ResultCommitter {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    pub async fn commit(&self, task_id: u64, output: &str) -> Result<SubmissionRecord> {
        let commitment = Commitment::of(output.as_bytes());
        tracing::info!(task_id, commitment = %commitment, "Submitting result");

        let args = vec![task_id.to_string(), commitment.to_argument()];
        let reply = self
            .ledger
            .call("submitResult", &args)
            .await
            .map_err(|e| WorkerError::SubmissionFailed {
                task_id,
                reason: e.to_string(),
            })?;

        let tx_hash = extract_tx_hash(&reply).ok_or_else(|| WorkerError::SubmissionFailed {
            task_id,
            reason: if reply.trim().is_empty() {
                "ledger returned an empty reply".to_string()
            } else {
                "no transaction reference in ledger reply".to_string()
            },
        })?;

        tracing::info!(task_id, tx_hash = %tx_hash, "Result submitted");
        Ok(SubmissionRecord {
            task_id,
            tx_hash,
            commitment,
            submitted_at: Utc::now(),
        })
    }
}
