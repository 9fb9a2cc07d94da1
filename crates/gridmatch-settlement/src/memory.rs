//! In-process ledger.
//!
//! [`InMemoryLedger`] implements [`LedgerGateway`] against local state. It
//! stands in for the settlement contract when running a node without a
//! chain, and it is the test double for every retry and idempotency path:
//! each fault knob below fires for the next N calls only.
//!
//! Contract behavior it reproduces:
//! - `submitSortedAddresses` records one sorted list per epoch key and
//!   reverts any second commit for the same key.
//! - `updateHour` advances the round and emits a sorting-needed event for
//!   both roles of every registered group.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use gridmatch_types::{
    EpochKey, GridmatchError, GroupId, LedgerEvent, ParticipantId, Result, SortRole,
    SortingRequest, TxReceipt, constants,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ledger::{CommittedSort, LedgerGateway, LedgerTransaction, SortedCommitArgs};

/// Failures for participants listed here never clear.
pub const ALWAYS: u32 = u32::MAX;

#[derive(Debug, Default)]
struct LedgerState {
    selling_prices: HashMap<(ParticipantId, u32), u64>,
    consumption: HashMap<(ParticipantId, u32), u64>,
    committed: HashMap<EpochKey, CommittedSort>,
    commit_sends: HashMap<EpochKey, u32>,
    groups: BTreeMap<GroupId, Vec<ParticipantId>>,
    sent: Vec<LedgerTransaction>,
    round: Option<u64>,
    block: u64,
}

#[derive(Debug, Default)]
struct Faults {
    fail_estimates: u32,
    fail_sends: u32,
    drop_acks: u32,
    revert_sends: u32,
    failing_reads: HashMap<ParticipantId, u32>,
    garble_views: u32,
    send_delay: Duration,
}

fn take(counter: &mut u32) -> bool {
    match *counter {
        0 => false,
        ALWAYS => true,
        _ => {
            *counter -= 1;
            true
        }
    }
}

pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    faults: Mutex<Faults>,
    events_tx: mpsc::UnboundedSender<LedgerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<LedgerEvent>>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(LedgerState::default()),
            faults: Mutex::new(Faults::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    // =================================================================
    // Contract state
    // =================================================================

    pub fn set_selling_price(&self, participant: &ParticipantId, hour: u32, price: u64) {
        self.state
            .lock()
            .selling_prices
            .insert((participant.clone(), hour), price);
    }

    pub fn set_consumption(&self, participant: &ParticipantId, hour: u32, amount: u64) {
        self.state
            .lock()
            .consumption
            .insert((participant.clone(), hour), amount);
    }

    /// Register a group whose members are signalled on every `updateHour`.
    pub fn register_group(&self, group: GroupId, members: Vec<ParticipantId>) {
        self.state.lock().groups.insert(group, members);
    }

    /// Push an event to the subscription.
    pub fn emit(&self, event: LedgerEvent) {
        // A closed receiver just means nobody listens any more.
        let _ = self.events_tx.send(event);
    }

    // =================================================================
    // Fault injection
    // =================================================================

    pub fn fail_next_estimates(&self, n: u32) {
        self.faults.lock().fail_estimates = n;
    }

    /// Sends fail with a network error before reaching the ledger.
    pub fn fail_next_sends(&self, n: u32) {
        self.faults.lock().fail_sends = n;
    }

    /// Sends land on the ledger but the caller sees a timeout.
    pub fn drop_next_acks(&self, n: u32) {
        self.faults.lock().drop_acks = n;
    }

    pub fn revert_next_sends(&self, n: u32) {
        self.faults.lock().revert_sends = n;
    }

    /// Reads of `participant`'s metrics fail `n` times ([`ALWAYS`] for
    /// forever).
    pub fn fail_reads(&self, participant: &ParticipantId, n: u32) {
        self.faults
            .lock()
            .failing_reads
            .insert(participant.clone(), n);
    }

    /// `sortedResult` answers with an undecodable value.
    pub fn garble_next_result_views(&self, n: u32) {
        self.faults.lock().garble_views = n;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.faults.lock().send_delay = delay;
    }

    // =================================================================
    // Inspection
    // =================================================================

    #[must_use]
    pub fn committed(&self, key: &EpochKey) -> Option<CommittedSort> {
        self.state.lock().committed.get(key).cloned()
    }

    /// Commit transactions for `key` that reached the ledger, including
    /// reverted duplicates.
    #[must_use]
    pub fn commit_sends(&self, key: &EpochKey) -> u32 {
        self.state
            .lock()
            .commit_sends
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn sent(&self) -> Vec<LedgerTransaction> {
        self.state.lock().sent.clone()
    }

    #[must_use]
    pub fn current_round(&self) -> Option<u64> {
        self.state.lock().round
    }

    // =================================================================
    // Contract execution
    // =================================================================

    fn execute(&self, tx: &LedgerTransaction) -> Result<TxReceipt> {
        let mut state = self.state.lock();
        let mut events = Vec::new();

        match tx.method.as_str() {
            constants::COMMIT_SORTED_METHOD => {
                let args: SortedCommitArgs = parse(&tx.method, tx.args.clone())?;
                let role = if args.is_buyer_sorting {
                    SortRole::Buyer
                } else {
                    SortRole::Seller
                };
                let key = EpochKey::new(args.round, GroupId(args.group), role);
                *state.commit_sends.entry(key).or_default() += 1;
                if state.committed.contains_key(&key) {
                    return Err(GridmatchError::LedgerReverted {
                        reason: format!("{key} already sorted"),
                    });
                }
                state.block += 1;
                let tx_hash = format!("0x{:064x}", state.block);
                state.committed.insert(
                    key,
                    CommittedSort {
                        tx_hash: tx_hash.clone(),
                        sorted: args.sorted,
                        digest: args.digest,
                    },
                );
                debug!(epoch = %key, tx_hash = %tx_hash, "Ledger recorded sorted list");
            }
            constants::UPDATE_HOUR_METHOD => {
                let round: u64 = parse(&tx.method, tx.args["round"].clone())?;
                state.block += 1;
                state.round = Some(round);
                events.push(LedgerEvent::RoundAdvanced { round });
                for (group, members) in &state.groups {
                    for role in [SortRole::Seller, SortRole::Buyer] {
                        events.push(LedgerEvent::SortingNeeded(SortingRequest {
                            key: EpochKey::new(round, *group, role),
                            participants: members.clone(),
                        }));
                    }
                }
            }
            other => {
                return Err(GridmatchError::LedgerReverted {
                    reason: format!("unknown method {other}"),
                });
            }
        }

        state.sent.push(tx.clone());
        let receipt = TxReceipt {
            tx_hash: format!("0x{:064x}", state.block),
            block: state.block,
        };
        drop(state);
        for event in events {
            self.emit(event);
        }
        Ok(receipt)
    }

    fn read_metric(&self, view: &str, args: &Value) -> Result<Value> {
        let participant: ParticipantId = parse(view, args["participant"].clone())?;
        let hour: u32 = parse(view, args["hour"].clone())?;

        if let Some(remaining) = self.faults.lock().failing_reads.get_mut(&participant) {
            if take(remaining) {
                return Err(GridmatchError::LedgerNetwork {
                    reason: format!("{view} read for {participant} failed"),
                });
            }
        }

        let state = self.state.lock();
        let table = if view == constants::SELLING_PRICE_VIEW {
            &state.selling_prices
        } else {
            &state.consumption
        };
        Ok(Value::from(
            table.get(&(participant, hour)).copied().unwrap_or(0),
        ))
    }
}

fn parse<T: DeserializeOwned>(context: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| GridmatchError::Serialization(format!("{context}: {e}")))
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn send_transaction(&self, tx: &LedgerTransaction) -> Result<TxReceipt> {
        let delay = self.faults.lock().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let drop_ack = {
            let mut faults = self.faults.lock();
            if take(&mut faults.fail_sends) {
                return Err(GridmatchError::LedgerNetwork {
                    reason: "connection reset".into(),
                });
            }
            if take(&mut faults.revert_sends) {
                return Err(GridmatchError::LedgerReverted {
                    reason: "execution reverted".into(),
                });
            }
            take(&mut faults.drop_acks)
        };

        let receipt = self.execute(tx)?;
        if drop_ack {
            return Err(GridmatchError::LedgerTimeout {
                operation: tx.method.clone(),
            });
        }
        Ok(receipt)
    }

    async fn estimate_cost(&self, tx: &LedgerTransaction) -> Result<u64> {
        if take(&mut self.faults.lock().fail_estimates) {
            return Err(GridmatchError::EstimationFailed {
                reason: format!("cannot estimate {}", tx.method),
            });
        }
        Ok(21_000 + 16 * tx.payload_len() as u64)
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            constants::SELLING_PRICE_VIEW | constants::CONSUMPTION_VIEW => {
                self.read_metric(method, &args)
            }
            constants::SORTED_RESULT_VIEW => {
                if take(&mut self.faults.lock().garble_views) {
                    return Ok(json!({ "sorted": "not-a-list" }));
                }
                let round: u64 = parse(method, args["round"].clone())?;
                let group: u32 = parse(method, args["group"].clone())?;
                let is_buyer: bool = parse(method, args["isBuyerSorting"].clone())?;
                let role = if is_buyer {
                    SortRole::Buyer
                } else {
                    SortRole::Seller
                };
                let key = EpochKey::new(round, GroupId(group), role);
                match self.state.lock().committed.get(&key) {
                    Some(sort) => serde_json::to_value(sort).map_err(GridmatchError::from),
                    None => Ok(Value::Null),
                }
            }
            other => Err(GridmatchError::LedgerReverted {
                reason: format!("unknown view {other}"),
            }),
        }
    }

    fn subscribe(&self, event: &str) -> Result<BoxStream<'static, LedgerEvent>> {
        if event != constants::SORTING_NEEDED_EVENT {
            return Err(GridmatchError::Configuration(format!(
                "unknown ledger event {event}"
            )));
        }
        let rx = self
            .events_rx
            .lock()
            .take()
            .ok_or_else(|| GridmatchError::SubscriptionConsumed(event.to_string()))?;
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ledger::{LedgerViews, key_args};

    fn commit_tx(key: &EpochKey, sorted: &[&str]) -> LedgerTransaction {
        let mut args = key_args(key);
        args["sorted"] = json!(sorted);
        LedgerTransaction::new(constants::COMMIT_SORTED_METHOD, args)
    }

    #[tokio::test]
    async fn commit_then_view() {
        let ledger = InMemoryLedger::new();
        let key = EpochKey::new(3, GroupId(1), SortRole::Seller);
        assert!(LedgerViews::new(&ledger).sorted_result(&key).await.unwrap().is_none());

        let receipt = ledger.send_transaction(&commit_tx(&key, &["0xa", "0xb"])).await.unwrap();
        let committed = LedgerViews::new(&ledger)
            .sorted_result(&key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(committed.tx_hash, receipt.tx_hash);
        assert_eq!(committed.sorted.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_commit_reverts() {
        let ledger = InMemoryLedger::new();
        let key = EpochKey::new(3, GroupId(1), SortRole::Buyer);
        ledger.send_transaction(&commit_tx(&key, &["0xa"])).await.unwrap();
        let err = ledger
            .send_transaction(&commit_tx(&key, &["0xb"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GridmatchError::LedgerReverted { .. }));
        assert_eq!(ledger.commit_sends(&key), 2);
        assert_eq!(ledger.committed(&key).unwrap().sorted[0].as_str(), "0xa");
    }

    #[tokio::test]
    async fn dropped_ack_still_lands() {
        let ledger = InMemoryLedger::new();
        ledger.drop_next_acks(1);
        let key = EpochKey::new(1, GroupId(1), SortRole::Seller);
        let err = ledger
            .send_transaction(&commit_tx(&key, &["0xa"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GridmatchError::LedgerTimeout { .. }));
        assert!(ledger.committed(&key).is_some());
    }

    #[tokio::test]
    async fn metric_reads_and_failures() {
        let ledger = InMemoryLedger::new();
        let p = ParticipantId::new("0xp");
        ledger.set_selling_price(&p, 5, 42);
        ledger.set_consumption(&p, 20, 7);
        let views = LedgerViews::new(&ledger);
        assert_eq!(views.selling_price(&p, 5).await.unwrap(), 42);
        assert_eq!(views.selling_price(&p, 6).await.unwrap(), 0);
        assert_eq!(views.consumption(&p, 20).await.unwrap(), 7);

        ledger.fail_reads(&p, 1);
        assert!(views.selling_price(&p, 5).await.is_err());
        assert!(views.selling_price(&p, 5).await.is_ok());

        ledger.fail_reads(&p, ALWAYS);
        for _ in 0..3 {
            assert!(views.consumption(&p, 20).await.is_err());
        }
    }

    #[tokio::test]
    async fn estimate_failures_are_counted() {
        let ledger = InMemoryLedger::new();
        ledger.fail_next_estimates(2);
        let tx = LedgerTransaction::new("x", json!({}));
        assert!(ledger.estimate_cost(&tx).await.is_err());
        assert!(ledger.estimate_cost(&tx).await.is_err());
        assert!(ledger.estimate_cost(&tx).await.unwrap() >= 21_000);
    }

    #[tokio::test]
    async fn update_hour_signals_registered_groups() {
        let ledger = InMemoryLedger::new();
        ledger.register_group(GroupId(2), vec![ParticipantId::new("0xa")]);
        let mut events = ledger.subscribe(constants::SORTING_NEEDED_EVENT).unwrap();

        ledger
            .send_transaction(&LedgerTransaction::new(
                constants::UPDATE_HOUR_METHOD,
                json!({"round": 48}),
            ))
            .await
            .unwrap();
        assert_eq!(ledger.current_round(), Some(48));

        assert_eq!(
            events.next().await,
            Some(LedgerEvent::RoundAdvanced { round: 48 })
        );
        let mut keys = Vec::new();
        for _ in 0..2 {
            match events.next().await {
                Some(LedgerEvent::SortingNeeded(req)) => keys.push(req.key),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(
            keys,
            vec![
                EpochKey::new(48, GroupId(2), SortRole::Seller),
                EpochKey::new(48, GroupId(2), SortRole::Buyer),
            ]
        );
    }

    #[tokio::test]
    async fn subscription_is_single_use() {
        let ledger = InMemoryLedger::new();
        let _first = ledger.subscribe(constants::SORTING_NEEDED_EVENT).unwrap();
        assert!(matches!(
            ledger.subscribe(constants::SORTING_NEEDED_EVENT),
            Err(GridmatchError::SubscriptionConsumed(_))
        ));
    }
}
