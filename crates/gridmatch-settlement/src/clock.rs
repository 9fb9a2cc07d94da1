//! Hourly round ticks.
//!
//! The ledger does not advance its own hour. [`RoundClock`] sends
//! `updateHour` at every wall-clock hour boundary; the ledger answers by
//! signalling which groups need sorting for the new round.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gridmatch_types::{Result, SettlementConfig, TxReceipt, constants};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::ledger::{LedgerGateway, LedgerTransaction};
use crate::retry::RetryPolicy;

const SECS_PER_HOUR: i64 = 3_600;

/// Time left until the next full hour.
#[must_use]
pub fn until_next_hour(now: DateTime<Utc>) -> Duration {
    let into_hour = now.timestamp().rem_euclid(SECS_PER_HOUR);
    let elapsed = Duration::from_secs(u64::try_from(into_hour).unwrap_or(0))
        + Duration::from_nanos(u64::from(now.timestamp_subsec_nanos()));
    Duration::from_secs(3_600).saturating_sub(elapsed)
}

/// Round id of the hour containing `now`: hours since the Unix epoch, so
/// `round % 24` is the UTC hour of day.
#[must_use]
pub fn round_at(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp().div_euclid(SECS_PER_HOUR)).unwrap_or(0)
}

pub struct RoundClock {
    ledger: Arc<dyn LedgerGateway>,
    policy: RetryPolicy,
}

impl RoundClock {
    pub fn new(ledger: Arc<dyn LedgerGateway>, config: &SettlementConfig) -> Self {
        Self {
            ledger,
            policy: RetryPolicy::new(config.retry.clone()),
        }
    }

    /// Advance the ledger to `round`.
    ///
    /// # Errors
    /// The last ledger error once the retry budget is spent.
    pub async fn tick(&self, round: u64) -> Result<TxReceipt> {
        let tx = LedgerTransaction::new(
            constants::UPDATE_HOUR_METHOD,
            json!({ "round": round, "hour": round % constants::HOURS_PER_DAY }),
        );
        let tx = &tx;
        let ledger = &self.ledger;
        let receipt = self
            .policy
            .run("update_hour", move || async move {
                ledger.estimate_cost(tx).await?;
                ledger.send_transaction(tx).await
            })
            .await?;
        info!(round, tx_hash = %receipt.tx_hash, "Ledger hour advanced");
        Ok(receipt)
    }

    /// Tick at every hour boundary until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("Round clock started");
        loop {
            let wait = until_next_hour(Utc::now());
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(wait) => {
                    let round = round_at(Utc::now());
                    if let Err(e) = self.tick(round).await {
                        error!(round, error = %e, "Hour tick failed");
                    }
                }
            }
        }
        info!("Round clock stopped");
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use gridmatch_types::RetryConfig;

    use super::*;
    use crate::memory::InMemoryLedger;

    #[test]
    fn until_next_hour_from_mid_hour() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 45, 30).unwrap();
        assert_eq!(until_next_hour(now), Duration::from_secs(14 * 60 + 30));
    }

    #[test]
    fn until_next_hour_on_boundary_is_full_hour() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(until_next_hour(now), Duration::from_secs(3_600));
    }

    #[test]
    fn round_hour_of_day_matches_utc_hour() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 19, 12, 0).unwrap();
        assert_eq!(round_at(now) % constants::HOURS_PER_DAY, 19);
    }

    #[tokio::test]
    async fn tick_retries_failed_estimates() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.fail_next_estimates(2);
        let clock = RoundClock::new(
            ledger.clone(),
            &SettlementConfig {
                retry: RetryConfig::immediate(3),
                ..SettlementConfig::default()
            },
        );
        clock.tick(500).await.unwrap();
        assert_eq!(ledger.current_round(), Some(500));
        assert_eq!(ledger.sent()[0].args["hour"], 500 % 24);
    }
}
