//! Participant metric fetching and the settlement sort.
//!
//! Sellers are ranked by their asking price for the round's hour of day,
//! buyers by their consumption summed over the trailing window. Each
//! participant is read independently with bounded concurrency; a read
//! that keeps failing excludes that participant instead of the epoch.

use std::sync::Arc;

use futures::{StreamExt, stream};
use gridmatch_types::{
    EpochKey, ExcludedParticipant, GridmatchError, ParticipantId, ParticipantMetric, Result,
    RetryConfig, SettlementConfig, SortRole,
};
use tracing::debug;

use crate::ledger::{LedgerGateway, LedgerViews};
use crate::retry::RetryPolicy;

/// Metrics for one epoch, split into usable and excluded participants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub metrics: Vec<ParticipantMetric>,
    pub excluded: Vec<ExcludedParticipant>,
}

pub struct MetricFetcher {
    ledger: Arc<dyn LedgerGateway>,
    policy: RetryPolicy,
    concurrency: usize,
    buyer_window: (u32, u32),
}

impl MetricFetcher {
    pub fn new(ledger: Arc<dyn LedgerGateway>, config: &SettlementConfig) -> Self {
        let backoff = u64::try_from(config.metric_fetch_backoff().as_millis()).unwrap_or(u64::MAX);
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: config.metric_fetch_attempts,
            initial_backoff_ms: backoff,
            max_backoff_ms: backoff.saturating_mul(8),
            ..config.retry.clone()
        });
        Self {
            ledger,
            policy,
            concurrency: config.metric_fetch_concurrency.max(1),
            buyer_window: (config.buyer_window_start_hour, config.buyer_window_end_hour),
        }
    }

    /// Read the metric of every participant for `key`.
    ///
    /// Output order follows `participants`, not completion order.
    pub async fn fetch(&self, key: &EpochKey, participants: &[ParticipantId]) -> FetchOutcome {
        let mut results: Vec<(usize, ParticipantId, Result<u64>)> =
            stream::iter(participants.iter().cloned().enumerate())
                .map(|(index, participant)| async move {
                    let value = self.fetch_one(key, &participant).await;
                    (index, participant, value)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut outcome = FetchOutcome::default();
        for (_, participant, value) in results {
            match value {
                Ok(value) => outcome.metrics.push(ParticipantMetric { participant, value }),
                Err(e) => {
                    let failure = GridmatchError::MetricFetchFailed {
                        participant: participant.clone(),
                        reason: e.to_string(),
                    };
                    outcome.excluded.push(ExcludedParticipant {
                        participant,
                        reason: failure.to_string(),
                    });
                }
            }
        }
        debug!(
            epoch = %key,
            fetched = outcome.metrics.len(),
            excluded = outcome.excluded.len(),
            "Metrics fetched"
        );
        outcome
    }

    async fn fetch_one(&self, key: &EpochKey, participant: &ParticipantId) -> Result<u64> {
        let views = LedgerViews::new(self.ledger.as_ref());
        match key.role {
            SortRole::Seller => {
                let hour = key.hour_of_day();
                self.policy
                    .run("selling_price", || views.selling_price(participant, hour))
                    .await
            }
            SortRole::Buyer => {
                let (start, end) = self.buyer_window;
                let mut total = 0u64;
                for hour in start..=end {
                    let amount = self
                        .policy
                        .run("consumption", || views.consumption(participant, hour))
                        .await?;
                    total = total.saturating_add(amount);
                }
                Ok(total)
            }
        }
    }
}

/// Ascending by metric value, ties broken by participant id.
#[must_use]
pub fn sort_by_metric(mut metrics: Vec<ParticipantMetric>) -> Vec<ParticipantId> {
    metrics.sort_by(|a, b| {
        a.value
            .cmp(&b.value)
            .then_with(|| a.participant.cmp(&b.participant))
    });
    metrics.into_iter().map(|m| m.participant).collect()
}
