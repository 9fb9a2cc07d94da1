//! Idempotent ledger commits of sorted participant lists.
//!
//! [`BatchSubmitter::commit`] writes at most one sorted list per epoch key:
//!
//! - Commits for the same key are serialized through [`KeyedLocks`].
//! - Every attempt first asks the ledger whether the key is already
//!   committed. A send whose acknowledgement was lost is found there
//!   instead of being resent.
//! - Cost estimation precedes every send. Transient failures of either
//!   back off exponentially up to the attempt budget, then surface as
//!   `SubmissionFailed`.
//! - Each ledger call is bounded by its own timeout, independent of the
//!   backoff.
//!
//! Payloads above the inline limit are externalized to the blob store and
//! only their digest travels with the sorted list.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gridmatch_types::{
    CommitReceipt, ContentDigest, EpochKey, GridmatchError, MeterReading, ParticipantId, Result,
    SettlementConfig, TxReceipt, constants,
};
use tracing::{debug, error, info, warn};

use crate::blob::BlobStore;
use crate::ledger::{CommittedSort, LedgerGateway, LedgerTransaction, LedgerViews, SortedCommitArgs};
use crate::locks::KeyedLocks;
use crate::retry::RetryPolicy;

/// What one attempt found or did.
enum Landed {
    /// The key was already committed on the ledger.
    Existing(CommittedSort),
    /// This attempt's transaction was included.
    Sent(TxReceipt),
}

pub struct BatchSubmitter {
    ledger: Arc<dyn LedgerGateway>,
    blobs: Option<Arc<dyn BlobStore>>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    inline_limit: usize,
    locks: KeyedLocks<EpochKey>,
}

impl BatchSubmitter {
    pub fn new(ledger: Arc<dyn LedgerGateway>, config: &SettlementConfig) -> Self {
        Self {
            ledger,
            blobs: None,
            policy: RetryPolicy::new(config.retry.clone()),
            attempt_timeout: config.attempt_timeout(),
            inline_limit: config.inline_payload_limit,
            locks: KeyedLocks::new(),
        }
    }

    #[must_use]
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Whether a commit for `key` is in flight.
    #[must_use]
    pub fn is_committing(&self, key: &EpochKey) -> bool {
        self.locks.is_locked(key)
    }

    /// Commit `ordered` for `key`, or report the commit already on the
    /// ledger.
    ///
    /// # Errors
    /// - `SubmissionFailed` once the attempt budget is spent on transient
    ///   failures.
    /// - `LedgerReverted` if the ledger rejected the commit and holds no
    ///   result for the key.
    /// - `BlobStore` / `Serialization` if the payload could not be built.
    pub async fn commit(
        &self,
        key: EpochKey,
        ordered: Vec<ParticipantId>,
        readings: Option<&[MeterReading]>,
    ) -> Result<CommitReceipt> {
        let _guard = self.locks.acquire(key).await;

        let (tx, digest) = self.build_transaction(&key, &ordered, readings).await?;
        let max = self.policy.max_attempts();
        let mut sends = 0u32;
        let mut last_error = None;

        for attempt in 1..=max {
            if attempt > 1 {
                tokio::time::sleep(self.policy.delay_for(attempt - 2)).await;
            }
            match self.attempt(&key, &tx, &mut sends).await {
                Ok(Landed::Existing(existing)) => {
                    info!(epoch = %key, tx_hash = %existing.tx_hash, attempt, "Epoch already committed on ledger");
                    return Ok(CommitReceipt {
                        key,
                        tx_hash: existing.tx_hash,
                        ordered: existing.sorted,
                        content_digest: existing.digest,
                        attempts: sends,
                        newly_committed: false,
                        committed_at: Utc::now(),
                    });
                }
                Ok(Landed::Sent(receipt)) => {
                    info!(
                        epoch = %key,
                        tx_hash = %receipt.tx_hash,
                        block = receipt.block,
                        attempt,
                        participants = ordered.len(),
                        "Sorted list committed"
                    );
                    return Ok(CommitReceipt {
                        key,
                        tx_hash: receipt.tx_hash,
                        ordered,
                        content_digest: digest,
                        attempts: sends,
                        newly_committed: true,
                        committed_at: Utc::now(),
                    });
                }
                Err(GridmatchError::LedgerReverted { reason }) => {
                    // A concurrent writer may have won the key.
                    if let Ok(Some(existing)) = self.existing(&key).await {
                        info!(epoch = %key, tx_hash = %existing.tx_hash, "Commit reverted; ledger already holds the epoch");
                        return Ok(CommitReceipt {
                            key,
                            tx_hash: existing.tx_hash,
                            ordered: existing.sorted,
                            content_digest: existing.digest,
                            attempts: sends,
                            newly_committed: false,
                            committed_at: Utc::now(),
                        });
                    }
                    error!(epoch = %key, attempt, reason = %reason, "Commit reverted");
                    return Err(GridmatchError::LedgerReverted { reason });
                }
                Err(e) if !e.is_retryable() => {
                    error!(epoch = %key, attempt, error = %e, "Commit failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(epoch = %key, attempt, max, error = %e, "Commit attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no attempts were made".to_string(), |e| e.to_string());
        error!(epoch = %key, attempts = max, reason = %reason, "Commit attempts exhausted");
        Err(GridmatchError::SubmissionFailed {
            key,
            attempts: max,
            reason,
        })
    }

    /// One check-estimate-send cycle. `sends` counts transactions handed
    /// to the ledger.
    async fn attempt(&self, key: &EpochKey, tx: &LedgerTransaction, sends: &mut u32) -> Result<Landed> {
        if let Some(existing) = self.existing(key).await? {
            return Ok(Landed::Existing(existing));
        }
        let cost = self
            .bounded("estimate_cost", self.ledger.estimate_cost(tx))
            .await?;
        debug!(epoch = %key, cost, "Commit cost estimated");

        *sends += 1;
        let receipt = self
            .bounded("send_transaction", self.ledger.send_transaction(tx))
            .await?;
        Ok(Landed::Sent(receipt))
    }

    async fn existing(&self, key: &EpochKey) -> Result<Option<CommittedSort>> {
        self.bounded(
            constants::SORTED_RESULT_VIEW,
            LedgerViews::new(self.ledger.as_ref()).sorted_result(key),
        )
        .await
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.attempt_timeout, call)
            .await
            .map_err(|_| GridmatchError::LedgerTimeout {
                operation: operation.to_string(),
            })?
    }

    async fn build_transaction(
        &self,
        key: &EpochKey,
        ordered: &[ParticipantId],
        readings: Option<&[MeterReading]>,
    ) -> Result<(LedgerTransaction, Option<ContentDigest>)> {
        let mut args = SortedCommitArgs {
            round: key.round,
            group: key.group.0,
            is_buyer_sorting: key.role.is_buyer_sorting(),
            sorted: ordered.to_vec(),
            digest: None,
            readings: readings.map(<[MeterReading]>::to_vec).unwrap_or_default(),
        };
        let tx = LedgerTransaction::new(constants::COMMIT_SORTED_METHOD, serde_json::to_value(&args)?);
        let size = tx.payload_len();
        if size <= self.inline_limit {
            return Ok((tx, None));
        }
        let Some(blobs) = &self.blobs else {
            warn!(epoch = %key, size, limit = self.inline_limit, "No blob store configured; sending oversized payload inline");
            return Ok((tx, None));
        };

        let bytes = serde_json::to_vec(&args)?;
        let digest = self
            .policy
            .run("blob_put", || blobs.put(bytes.clone()))
            .await?;
        debug!(epoch = %key, size, digest = %digest, "Payload externalized");

        args.digest = Some(digest);
        args.readings.clear();
        let tx = LedgerTransaction::new(constants::COMMIT_SORTED_METHOD, serde_json::to_value(&args)?);
        Ok((tx, Some(digest)))
    }
}
