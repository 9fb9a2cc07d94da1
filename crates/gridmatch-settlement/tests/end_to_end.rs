//! End-to-end settlement tests.
//!
//! These drive the full path a ledger signal takes: coordinator ->
//! metric fetch -> sort -> batch submitter -> ledger -> sorted-result store
//! -> broadcast, against the in-process ledger with injected faults.

use std::sync::Arc;
use std::time::Duration;

use gridmatch_settlement::{
    Control, InMemoryBlobStore, InMemoryLedger, InMemorySortedResultStore, LedgerGateway,
    RoundClock, SortOutcome, SortingCoordinator, SortedResultStore,
};
use gridmatch_types::*;
use tokio::sync::mpsc;

/// Helper: one ledger, one store, one coordinator.
struct SettlementHarness {
    ledger: Arc<InMemoryLedger>,
    store: Arc<InMemorySortedResultStore>,
    publisher: Arc<RecordingPublisher>,
    coordinator: Arc<SortingCoordinator>,
}

fn test_config() -> SettlementConfig {
    SettlementConfig {
        metric_fetch_attempts: 2,
        metric_fetch_backoff_ms: 1,
        retry: RetryConfig::immediate(3),
        attempt_timeout_ms: 500,
        retry_pass_interval_ms: 50,
        ..SettlementConfig::default()
    }
}

impl SettlementHarness {
    fn new() -> Self {
        Self::with_config(test_config(), None)
    }

    fn with_config(config: SettlementConfig, blobs: Option<Arc<InMemoryBlobStore>>) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(InMemorySortedResultStore::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let mut coordinator =
            SortingCoordinator::new(ledger.clone(), store.clone(), publisher.clone(), &config);
        if let Some(blobs) = blobs {
            coordinator = coordinator.with_blob_store(blobs);
        }
        Self {
            ledger,
            store,
            publisher,
            coordinator: Arc::new(coordinator),
        }
    }

    /// Sellers `0x01..` with the given prices at `hour`.
    fn sellers(&self, hour: u32, prices: &[u64]) -> Vec<ParticipantId> {
        prices
            .iter()
            .enumerate()
            .map(|(i, price)| {
                let p = ParticipantId::new(format!("0x{:02}", i + 1));
                self.ledger.set_selling_price(&p, hour, *price);
                p
            })
            .collect()
    }

    fn committed_results(&self) -> usize {
        self.publisher
            .events()
            .iter()
            .filter(|e| matches!(e, FeedEvent::SortedResult(_)))
            .count()
    }
}

fn seller_request(round: u64, participants: Vec<ParticipantId>) -> SortingRequest {
    SortingRequest {
        key: EpochKey::new(round, GroupId(1), SortRole::Seller),
        participants,
    }
}

fn names(ids: &[ParticipantId]) -> Vec<&str> {
    ids.iter().map(ParticipantId::as_str).collect()
}

#[tokio::test]
async fn e2e_duplicate_signal_commits_once() {
    let h = SettlementHarness::new();
    let participants = h.sellers(10, &[30, 10, 20]);
    let req = seller_request(10, participants);

    let first = h.coordinator.on_sorting_needed(req.clone()).await.unwrap();
    let second = h.coordinator.on_sorting_needed(req.clone()).await.unwrap();

    assert!(matches!(first, SortOutcome::Committed(_)));
    assert!(matches!(second, SortOutcome::AlreadyCommitted(_)));
    assert_eq!(first.result(), second.result());
    assert_eq!(h.ledger.commit_sends(&req.key), 1);
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.committed_results(), 1);
}

#[tokio::test]
async fn e2e_concurrent_duplicate_signals_commit_once() {
    let h = SettlementHarness::new();
    h.ledger.set_send_delay(Duration::from_millis(10));
    let participants = h.sellers(4, &[5, 4, 3, 2, 1]);
    let req = seller_request(4, participants);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&h.coordinator);
            let req = req.clone();
            tokio::spawn(async move { coordinator.on_sorting_needed(req).await })
        })
        .collect();
    let mut committed = 0;
    for handle in handles {
        if matches!(handle.await.unwrap().unwrap(), SortOutcome::Committed(_)) {
            committed += 1;
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(h.ledger.commit_sends(&req.key), 1);
    assert_eq!(h.committed_results(), 1);
}

#[tokio::test]
async fn e2e_failed_participant_is_excluded_not_fatal() {
    let h = SettlementHarness::new();
    let participants = h.sellers(8, &[50, 40, 30, 20, 10]);
    h.ledger.fail_reads(&participants[2], u32::MAX);

    let outcome = h
        .coordinator
        .on_sorting_needed(seller_request(8, participants))
        .await
        .unwrap();
    let result = outcome.result().unwrap();

    assert_eq!(names(&result.ordered), vec!["0x05", "0x04", "0x02", "0x01"]);
    assert!(result.is_partial());
    assert_eq!(result.excluded.len(), 1);
    assert_eq!(result.excluded[0].participant.as_str(), "0x03");
}

#[tokio::test]
async fn e2e_lost_acknowledgement_does_not_double_commit() {
    let h = SettlementHarness::new();
    h.ledger.drop_next_acks(1);
    let participants = h.sellers(2, &[2, 1]);
    let req = seller_request(2, participants);

    let outcome = h.coordinator.on_sorting_needed(req.clone()).await.unwrap();

    assert!(matches!(outcome, SortOutcome::Committed(_)));
    assert_eq!(h.ledger.commit_sends(&req.key), 1);
    let on_ledger = h.ledger.committed(&req.key).unwrap();
    assert_eq!(outcome.result().unwrap().tx_hash, on_ledger.tx_hash);
}

#[tokio::test]
async fn e2e_estimation_failures_are_retried() {
    let h = SettlementHarness::new();
    h.ledger.fail_next_estimates(2);
    let req = seller_request(3, h.sellers(3, &[1]));

    let outcome = h.coordinator.on_sorting_needed(req.clone()).await.unwrap();
    assert!(matches!(outcome, SortOutcome::Committed(_)));
    assert_eq!(h.ledger.commit_sends(&req.key), 1);
}

#[tokio::test]
async fn e2e_exhausted_commit_stays_pending_then_recovers() {
    let h = SettlementHarness::new();
    h.ledger.fail_next_sends(3);
    let req = seller_request(6, h.sellers(6, &[3, 1, 2]));

    let outcome = h.coordinator.on_sorting_needed(req.clone()).await.unwrap();
    match &outcome {
        SortOutcome::Deferred { key, reason } => {
            assert_eq!(*key, req.key);
            assert!(reason.contains("GM_ERR_600"), "Got: {reason}");
        }
        other => panic!("expected deferral, got {other:?}"),
    }
    assert_eq!(h.coordinator.pending_keys(), vec![req.key]);
    assert!(h.store.get(&req.key).await.unwrap().is_none());
    assert!(!h.coordinator.is_in_flight(&req.key));

    assert_eq!(h.coordinator.retry_pending().await, 1);
    assert!(h.coordinator.pending_keys().is_empty());
    let stored = h.store.get(&req.key).await.unwrap().unwrap();
    assert_eq!(names(&stored.ordered), vec!["0x02", "0x03", "0x01"]);
}

#[tokio::test]
async fn e2e_large_payload_is_externalized() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let h = SettlementHarness::with_config(
        SettlementConfig {
            inline_payload_limit: 256,
            ..test_config()
        },
        Some(blobs.clone()),
    );
    let participants = h.sellers(9, &[1, 2, 3]);
    let readings: Vec<MeterReading> = (0..50)
        .map(|i| MeterReading {
            participant: participants[i % 3].clone(),
            generation: i as u64,
            consumption: 1,
        })
        .collect();
    h.coordinator
        .stage_readings(9, GroupId(1), readings)
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .on_sorting_needed(seller_request(9, participants))
        .await
        .unwrap();
    let digest = outcome.result().unwrap().content_digest.unwrap();

    assert_eq!(blobs.len(), 1);
    let key = EpochKey::new(9, GroupId(1), SortRole::Seller);
    assert_eq!(h.ledger.committed(&key).unwrap().digest, Some(digest));
    assert!(h.coordinator.staged_readings(9, GroupId(1)).is_empty());
}

#[tokio::test]
async fn e2e_buyers_sorted_by_window_consumption() {
    let h = SettlementHarness::new();
    let a = ParticipantId::new("0xa");
    let b = ParticipantId::new("0xb");
    let c = ParticipantId::new("0xc");
    for hour in 19..=22 {
        h.ledger.set_consumption(&a, hour, 5);
        h.ledger.set_consumption(&b, hour, 1);
        h.ledger.set_consumption(&c, hour, 5);
    }
    h.ledger.set_consumption(&b, 12, 1_000);

    let outcome = h
        .coordinator
        .on_sorting_needed(SortingRequest {
            key: EpochKey::new(100, GroupId(3), SortRole::Buyer),
            participants: vec![c, a, b],
        })
        .await
        .unwrap();
    assert_eq!(names(&outcome.result().unwrap().ordered), vec!["0xb", "0xa", "0xc"]);
}

#[tokio::test]
async fn e2e_run_loop_consumes_ledger_signals() {
    let h = SettlementHarness::new();
    let members = h.sellers(0, &[7, 3]);
    for p in &members {
        for hour in 19..=22 {
            h.ledger.set_consumption(p, hour, 1);
        }
    }
    h.ledger.register_group(GroupId(1), members);

    let events = h.ledger.subscribe(constants::SORTING_NEEDED_EVENT).unwrap();
    let (control_tx, control_rx) = mpsc::channel(4);
    let runner = tokio::spawn(Arc::clone(&h.coordinator).run(events, control_rx));

    // Round 24 is hour 0 of day two.
    let clock = RoundClock::new(h.ledger.clone(), &test_config());
    clock.tick(24).await.unwrap();
    // The replayed signal must be absorbed.
    h.ledger.emit(LedgerEvent::SortingNeeded(seller_request(
        24,
        vec![ParticipantId::new("0x01"), ParticipantId::new("0x02")],
    )));

    let seller = EpochKey::new(24, GroupId(1), SortRole::Seller);
    let buyer = EpochKey::new(24, GroupId(1), SortRole::Buyer);
    for _ in 0..200 {
        if h.store.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let stored = h.store.get(&seller).await.unwrap().unwrap();
    assert_eq!(names(&stored.ordered), vec!["0x02", "0x01"]);
    assert!(h.store.get(&buyer).await.unwrap().is_some());

    control_tx.send(Control::Shutdown).await.unwrap();
    runner.await.unwrap();
    assert_eq!(h.ledger.commit_sends(&seller), 1);
    assert!(!h.coordinator.is_in_flight(&seller));
}

#[tokio::test]
async fn e2e_retry_pass_runs_on_schedule() {
    let h = SettlementHarness::new();
    h.ledger.fail_next_sends(3);
    let req = seller_request(30, h.sellers(6, &[1, 2]));

    let events = h.ledger.subscribe(constants::SORTING_NEEDED_EVENT).unwrap();
    let (control_tx, control_rx) = mpsc::channel(4);
    let runner = tokio::spawn(Arc::clone(&h.coordinator).run(events, control_rx));
    h.ledger.emit(LedgerEvent::SortingNeeded(req.clone()));

    for _ in 0..200 {
        if h.store.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(h.store.get(&req.key).await.unwrap().is_some());
    assert!(h.coordinator.pending_keys().is_empty());

    control_tx.send(Control::Shutdown).await.unwrap();
    runner.await.unwrap();
}

#[tokio::test]
async fn e2e_shutdown_aborts_in_flight_commit_and_releases_key() {
    let h = SettlementHarness::new();
    h.ledger.set_send_delay(Duration::from_secs(30));
    let req = seller_request(40, h.sellers(16, &[1]));

    let events = h.ledger.subscribe(constants::SORTING_NEEDED_EVENT).unwrap();
    let (control_tx, control_rx) = mpsc::channel(4);
    let runner = tokio::spawn(Arc::clone(&h.coordinator).run(events, control_rx));
    h.ledger.emit(LedgerEvent::SortingNeeded(req.clone()));

    for _ in 0..200 {
        if h.coordinator.is_in_flight(&req.key) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(h.coordinator.is_in_flight(&req.key));

    control_tx.send(Control::Shutdown).await.unwrap();
    runner.await.unwrap();

    assert!(!h.coordinator.is_in_flight(&req.key));
    assert!(h.ledger.committed(&req.key).is_none());
}
