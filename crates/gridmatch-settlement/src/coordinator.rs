//! The settlement sorting coordinator.
//!
//! One "sorting needed" signal from the ledger becomes at most one
//! committed [`SortedResult`] per epoch key:
//!
//! 1. The sorted-result store is checked first, so duplicate or replayed
//!    signals end as no-ops.
//! 2. Participant metrics are fetched in parallel. Participants whose
//!    reads keep failing are excluded and recorded on the result.
//! 3. The survivors are sorted ascending, ties by participant id.
//! 4. [`BatchSubmitter`] commits the list, then the result is stored with
//!    a conditional insert and broadcast.
//!
//! Work for one key is serialized; distinct keys run concurrently. An
//! epoch whose commit fails is parked in a pending set and retried by the
//! periodic pass in [`SortingCoordinator::run`], never marked as done.
//!
//! Staged meter readings share the seller key's lock, so a reading is
//! either part of that seller commit or rejected once the commit landed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::BoxStream;
use gridmatch_types::{
    EpochKey, ErrorClass, EventPublisher, FeedEvent, GridmatchError, GroupId, LedgerEvent,
    MeterReading, Result, SettlementConfig, SortRole, SortedResult, SortingRequest, constants,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::blob::BlobStore;
use crate::idempotency::{InsertOutcome, SortedResultStore};
use crate::ledger::LedgerGateway;
use crate::locks::KeyedLocks;
use crate::metrics::{MetricFetcher, sort_by_metric};
use crate::submitter::BatchSubmitter;

/// How a sorting signal was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOutcome {
    /// This call committed and stored the result.
    Committed(SortedResult),
    /// A result for the key was already stored; nothing was done.
    AlreadyCommitted(SortedResult),
    /// A transient failure left the epoch uncommitted; it is queued for
    /// the next retry pass.
    Deferred { key: EpochKey, reason: String },
}

impl SortOutcome {
    /// The stored result, unless the epoch was deferred.
    #[must_use]
    pub fn result(&self) -> Option<&SortedResult> {
        match self {
            Self::Committed(r) | Self::AlreadyCommitted(r) => Some(r),
            Self::Deferred { .. } => None,
        }
    }
}

/// Messages to a running coordinator loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Re-run every pending epoch now.
    RetryPending,
    /// Stop consuming events and abort in-flight work.
    Shutdown,
}

#[derive(Debug, Default)]
struct StagedReadings {
    by_round: HashMap<(u64, GroupId), Vec<MeterReading>>,
    /// Latest committed seller round per group.
    committed_through: HashMap<GroupId, u64>,
}

pub struct SortingCoordinator {
    fetcher: MetricFetcher,
    submitter: BatchSubmitter,
    results: Arc<dyn SortedResultStore>,
    publisher: Arc<dyn EventPublisher>,
    locks: KeyedLocks<EpochKey>,
    pending: DashMap<EpochKey, SortingRequest>,
    staged: Mutex<StagedReadings>,
    retry_pass_interval: Duration,
}

impl SortingCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        results: Arc<dyn SortedResultStore>,
        publisher: Arc<dyn EventPublisher>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            fetcher: MetricFetcher::new(Arc::clone(&ledger), config),
            submitter: BatchSubmitter::new(ledger, config),
            results,
            publisher,
            locks: KeyedLocks::new(),
            pending: DashMap::new(),
            staged: Mutex::new(StagedReadings::default()),
            retry_pass_interval: config.retry_pass_interval(),
        }
    }

    /// Externalize oversized commit payloads to `blobs`.
    #[must_use]
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.submitter = self.submitter.with_blob_store(blobs);
        self
    }

    /// Handle one sorting signal.
    ///
    /// # Errors
    /// - `InvalidEpoch` for an empty participant list; nothing is queued.
    /// - Any non-transient failure past validation, such as a revert or a
    ///   malformed ledger answer. The epoch stays pending.
    ///
    /// Transient failures are not errors: they yield
    /// [`SortOutcome::Deferred`].
    pub async fn on_sorting_needed(&self, request: SortingRequest) -> Result<SortOutcome> {
        let request = request.normalized()?;
        let key = request.key;
        let _guard = self.locks.acquire(key).await;

        match self.process(&request).await {
            Ok(outcome) => {
                self.pending.remove(&key);
                Ok(outcome)
            }
            Err(e) => match e.class() {
                ErrorClass::Transient => {
                    warn!(epoch = %key, error = %e, "Epoch left uncommitted, queued for retry");
                    self.pending.insert(key, request);
                    Ok(SortOutcome::Deferred {
                        key,
                        reason: e.to_string(),
                    })
                }
                ErrorClass::InvalidInput | ErrorClass::Conflict | ErrorClass::Fatal => {
                    error!(epoch = %key, error = %e, class = %e.class(), "Epoch failed");
                    self.pending.insert(key, request);
                    Err(e)
                }
            },
        }
    }

    async fn process(&self, request: &SortingRequest) -> Result<SortOutcome> {
        let key = request.key;
        if let Some(existing) = self.results.get(&key).await? {
            debug!(epoch = %key, "Duplicate sorting signal absorbed");
            if key.role == SortRole::Seller {
                self.release_staged(&key, usize::MAX);
            }
            return Ok(SortOutcome::AlreadyCommitted(existing));
        }

        let fetched = self.fetcher.fetch(&key, &request.participants).await;
        for excluded in &fetched.excluded {
            warn!(
                epoch = %key,
                participant = %excluded.participant,
                reason = %excluded.reason,
                "Participant excluded from sort, metric unavailable"
            );
        }
        if fetched.metrics.is_empty() {
            return Err(GridmatchError::NoMetrics(key));
        }
        let ordered = sort_by_metric(fetched.metrics);

        let readings = (key.role == SortRole::Seller)
            .then(|| self.staged_readings(key.round, key.group))
            .filter(|r| !r.is_empty());

        let receipt = self
            .submitter
            .commit(key, ordered, readings.as_deref())
            .await?;
        if key.role == SortRole::Seller {
            self.release_staged(&key, readings.as_ref().map_or(0, Vec::len));
        }

        let mut excluded = fetched.excluded;
        excluded.retain(|x| !receipt.ordered.contains(&x.participant));
        let result = SortedResult {
            key,
            ordered: receipt.ordered,
            excluded,
            content_digest: receipt.content_digest,
            tx_hash: receipt.tx_hash,
            submitted_at: receipt.committed_at,
        };

        match self.results.insert_if_absent(result.clone()).await? {
            InsertOutcome::Inserted => {
                info!(
                    epoch = %key,
                    participants = result.ordered.len(),
                    partial = result.is_partial(),
                    tx_hash = %result.tx_hash,
                    "Sorted result recorded"
                );
                self.publisher
                    .publish(&FeedEvent::SortedResult(result.clone()));
                Ok(SortOutcome::Committed(result))
            }
            InsertOutcome::AlreadyPresent(existing) => Ok(SortOutcome::AlreadyCommitted(existing)),
        }
    }

    /// Stage metered readings for a round's group. They ride along with
    /// that round's seller commit and are discarded once it lands.
    ///
    /// Waits for an in-flight seller commit of the same round. Returns how
    /// many readings are now staged for `(round, group)`.
    ///
    /// # Errors
    /// - `EpochAlreadyCommitted` if the round's seller result exists.
    /// - `InvalidEpoch` if a later seller round of the group is already
    ///   committed and this one is not pending.
    pub async fn stage_readings(
        &self,
        round: u64,
        group: GroupId,
        readings: Vec<MeterReading>,
    ) -> Result<usize> {
        let key = EpochKey::new(round, group, SortRole::Seller);
        let _guard = self.locks.acquire(key).await;
        if self.results.get(&key).await?.is_some() {
            return Err(GridmatchError::EpochAlreadyCommitted(key));
        }
        self.append_staged(&key, readings)
    }

    fn append_staged(&self, key: &EpochKey, readings: Vec<MeterReading>) -> Result<usize> {
        let mut staged = self.staged.lock();
        if let Some(&through) = staged.committed_through.get(&key.group) {
            if key.round <= through && !self.pending.contains_key(key) {
                return Err(GridmatchError::InvalidEpoch {
                    reason: format!(
                        "{key} is behind the group's committed seller round {through}"
                    ),
                });
            }
        }
        let count = readings.len();
        let entry = staged.by_round.entry((key.round, key.group)).or_default();
        entry.extend(readings);
        let total = entry.len();
        debug!(epoch = %key, count, total, "Readings staged");
        Ok(total)
    }

    /// Drop the first `committed` readings of `key`'s round, then prune
    /// rounds of the group at or below it and rounds past the retention
    /// horizon. Pending and in-flight seller rounds keep their readings.
    fn release_staged(&self, key: &EpochKey, committed: usize) {
        let mut guard = self.staged.lock();
        let staged = &mut *guard;
        let own = (key.round, key.group);
        if let Some(readings) = staged.by_round.get_mut(&own) {
            let done = committed.min(readings.len());
            readings.drain(..done);
            if readings.is_empty() {
                staged.by_round.remove(&own);
            }
        }

        let through = staged.committed_through.entry(key.group).or_insert(key.round);
        *through = (*through).max(key.round);
        let through = *through;
        let horizon = key
            .round
            .saturating_sub(constants::STAGED_READINGS_RETENTION_ROUNDS);

        let before = staged.by_round.len();
        staged.by_round.retain(|&(round, group), _| {
            let stale = (group == key.group && round <= through) || round < horizon;
            !stale || self.is_live(&EpochKey::new(round, group, SortRole::Seller))
        });
        let pruned = before - staged.by_round.len();
        if pruned > 0 {
            debug!(epoch = %key, pruned, "Stale staged readings dropped");
        }
    }

    fn is_live(&self, key: &EpochKey) -> bool {
        self.pending.contains_key(key) || self.locks.is_locked(key)
    }

    /// Readings staged and not yet committed for `(round, group)`.
    #[must_use]
    pub fn staged_readings(&self, round: u64, group: GroupId) -> Vec<MeterReading> {
        self.staged
            .lock()
            .by_round
            .get(&(round, group))
            .cloned()
            .unwrap_or_default()
    }

    /// Re-run every pending epoch. Returns how many now have a result.
    pub async fn retry_pending(&self) -> usize {
        let requests: Vec<SortingRequest> =
            self.pending.iter().map(|e| e.value().clone()).collect();
        if requests.is_empty() {
            return 0;
        }
        info!(count = requests.len(), "Retrying uncommitted epochs");
        join_all(requests.into_iter().map(|r| self.on_sorting_needed(r)))
            .await
            .iter()
            .filter(|o| matches!(o, Ok(outcome) if outcome.result().is_some()))
            .count()
    }

    /// Epochs waiting for a retry, in key order.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<EpochKey> {
        let mut keys: Vec<EpochKey> = self.pending.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    /// Whether `key` is being processed right now.
    #[must_use]
    pub fn is_in_flight(&self, key: &EpochKey) -> bool {
        self.locks.is_locked(key)
    }

    pub async fn sorted_result(&self, key: &EpochKey) -> Result<Option<SortedResult>> {
        self.results.get(key).await
    }

    // =================================================================
    // Event loop
    // =================================================================

    /// Consume ledger events until shutdown.
    ///
    /// Each sorting signal runs as its own task; per-key serialization
    /// comes from [`Self::on_sorting_needed`]. Pending epochs are retried
    /// every `retry_pass_interval` and on [`Control::RetryPending`].
    /// [`Control::Shutdown`], a closed control channel or the end of the
    /// event stream stops the loop and aborts in-flight tasks; their key
    /// guards are released as the tasks drop.
    pub async fn run(
        self: Arc<Self>,
        mut events: BoxStream<'static, LedgerEvent>,
        mut control: mpsc::Receiver<Control>,
    ) {
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut retry_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + self.retry_pass_interval,
            self.retry_pass_interval,
        );
        retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(retry_pass_interval = ?self.retry_pass_interval, "Sorting coordinator started");

        loop {
            tokio::select! {
                biased;
                command = control.recv() => match command {
                    Some(Control::RetryPending) => self.spawn_retry_pass(&mut tasks),
                    Some(Control::Shutdown) | None => {
                        info!("Sorting coordinator shutting down");
                        break;
                    }
                },
                event = events.next() => match event {
                    Some(LedgerEvent::SortingNeeded(request)) => {
                        debug!(epoch = %request.key, participants = request.participants.len(), "Sorting signal received");
                        let this = Arc::clone(&self);
                        tasks.spawn(async move { this.handle(request).await });
                    }
                    Some(LedgerEvent::RoundAdvanced { round }) => {
                        info!(round, "Ledger round advanced");
                    }
                    None => {
                        warn!("Ledger event stream ended");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Sorting task panicked");
                        }
                    }
                }
                _ = retry_tick.tick() => self.spawn_retry_pass(&mut tasks),
            }
        }

        tasks.shutdown().await;
        info!(pending = self.pending.len(), "Sorting coordinator stopped");
    }

    fn spawn_retry_pass(self: &Arc<Self>, tasks: &mut JoinSet<()>) {
        if self.pending.is_empty() {
            return;
        }
        let this = Arc::clone(self);
        tasks.spawn(async move {
            let recovered = this.retry_pending().await;
            debug!(recovered, "Retry pass finished");
        });
    }

    async fn handle(&self, request: SortingRequest) {
        let key = request.key;
        match self.on_sorting_needed(request).await {
            Ok(SortOutcome::Committed(_)) => debug!(epoch = %key, "Sorting signal handled"),
            Ok(SortOutcome::AlreadyCommitted(_)) => debug!(epoch = %key, "Sorting signal was a duplicate"),
            Ok(SortOutcome::Deferred { .. }) => {}
            Err(e) => error!(epoch = %key, error = %e, "Sorting signal failed"),
        }
    }
}
