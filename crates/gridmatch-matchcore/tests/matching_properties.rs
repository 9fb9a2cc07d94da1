//! Integration test: matching engine properties
//!
//! Drives the engine end to end through the in-memory store and checks
//! the behavioral guarantees: resting-price clearing, partial fills,
//! price-time priority, conservation and replay determinism.

use std::collections::HashMap;
use std::sync::Arc;

use gridmatch_matchcore::{
    InMemoryOrderStore, MatchingEngine, OrderHandle, OrderStore, compute_match_root,
};
use gridmatch_types::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn new_engine() -> (MatchingEngine, Arc<InMemoryOrderStore>) {
    let store = Arc::new(InMemoryOrderStore::new());
    let engine = MatchingEngine::new(store.clone(), Arc::new(NoopPublisher));
    (engine, store)
}

async fn submit(
    engine: &MatchingEngine,
    who: &str,
    side: OrderSide,
    amount: i64,
    price: i64,
) -> OrderHandle {
    engine
        .submit(OrderRequest::limit(who, side, amount, price))
        .await
        .expect("submission should be accepted")
}

#[tokio::test]
async fn round_trip_uses_resting_price() {
    let (engine, _) = new_engine();
    let buy = submit(&engine, "0xbuyer", OrderSide::Buy, 10, 50).await;
    let sell = submit(&engine, "0xseller", OrderSide::Sell, 10, 45).await;

    assert_eq!(sell.matches.len(), 1);
    let m = &sell.matches[0];
    assert_eq!(m.amount, 10);
    assert_eq!(m.clearing_price, 50);
    assert_eq!(m.buy_order_id, buy.order.id);
    assert_eq!(m.sell_order_id, sell.order.id);

    for id in [buy.order.id, sell.order.id] {
        let order = engine.order(&id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Matched);
        assert_eq!(order.remaining, 0);
    }
}

#[tokio::test]
async fn partial_fills_complete_the_buy() {
    let (engine, store) = new_engine();
    let buy = submit(&engine, "0xbuyer", OrderSide::Buy, 10, 50).await;

    let first = submit(&engine, "0xs1", OrderSide::Sell, 4, 45).await;
    let after_first = engine.order(&buy.order.id).await.unwrap().unwrap();
    assert_eq!(after_first.status, OrderStatus::PartiallyMatched);
    assert_eq!(after_first.remaining, 6);

    let second = submit(&engine, "0xs2", OrderSide::Sell, 6, 45).await;

    let matches = store.matches(&MarketId::default()).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches.iter().map(|m| m.amount).sum::<u64>(), 10);
    assert!(matches.iter().all(|m| m.clearing_price == 50));

    for id in [buy.order.id, first.order.id, second.order.id] {
        assert_eq!(
            engine.order(&id).await.unwrap().unwrap().status,
            OrderStatus::Matched
        );
    }
    assert!(engine.book_snapshot(&MarketId::default()).await.bids.is_empty());
}

#[tokio::test]
async fn earliest_resting_order_at_best_price_fills_first() {
    let (engine, _) = new_engine();
    let worse = submit(&engine, "0xworse", OrderSide::Sell, 5, 46).await;
    let early = submit(&engine, "0xearly", OrderSide::Sell, 5, 45).await;
    let late = submit(&engine, "0xlate", OrderSide::Sell, 5, 45).await;

    let buy = submit(&engine, "0xbuyer", OrderSide::Buy, 7, 50).await;
    assert_eq!(buy.matches.len(), 2);
    assert_eq!(buy.matches[0].sell_order_id, early.order.id);
    assert_eq!(buy.matches[0].amount, 5);
    assert_eq!(buy.matches[1].sell_order_id, late.order.id);
    assert_eq!(buy.matches[1].amount, 2);
    assert!(buy.matches.iter().all(|m| m.clearing_price == 45));

    let worse_now = engine.order(&worse.order.id).await.unwrap().unwrap();
    assert_eq!(worse_now.status, OrderStatus::Pending);
}

#[tokio::test]
async fn incoming_order_sweeps_until_no_cross() {
    let (engine, _) = new_engine();
    submit(&engine, "0xb1", OrderSide::Buy, 3, 52).await;
    submit(&engine, "0xb2", OrderSide::Buy, 3, 51).await;
    submit(&engine, "0xb3", OrderSide::Buy, 3, 49).await;

    let sell = submit(&engine, "0xs", OrderSide::Sell, 10, 50).await;
    let prices: Vec<u64> = sell.matches.iter().map(|m| m.clearing_price).collect();
    assert_eq!(prices, vec![52, 51]);
    assert_eq!(sell.order.remaining, 4);
    assert_eq!(sell.order.status, OrderStatus::PartiallyMatched);

    let book = engine.book_snapshot(&MarketId::default()).await;
    assert_eq!(book.bids[0].price, 49);
    assert_eq!(book.asks[0].price, 50);
    assert_eq!(book.asks[0].amount, 4);
}

/// Random order flow for the conservation and replay properties.
fn random_flow(seed: u64, n: usize) -> Vec<(String, OrderSide, i64, i64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let side = if rng.gen_bool(0.5) {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            (
                format!("0x{:02x}", i % 7),
                side,
                rng.gen_range(1..=20),
                rng.gen_range(40..=60),
            )
        })
        .collect()
}

#[tokio::test]
async fn matched_amounts_never_exceed_order_amounts() {
    let (engine, store) = new_engine();
    for (who, side, amount, price) in random_flow(7, 300) {
        submit(&engine, &who, side, amount, price).await;
    }

    let orders = store.orders(&MarketId::default()).await.unwrap();
    let matches = store.matches(&MarketId::default()).await.unwrap();
    assert!(!matches.is_empty());

    let mut filled: HashMap<OrderId, u64> = HashMap::new();
    for m in &matches {
        *filled.entry(m.buy_order_id).or_default() += m.amount;
        *filled.entry(m.sell_order_id).or_default() += m.amount;
    }
    for order in &orders {
        let total = filled.get(&order.id).copied().unwrap_or(0);
        assert!(total <= order.amount, "order {} overfilled", order.id);
        assert_eq!(total, order.matched_amount());
        assert_eq!(order.status == OrderStatus::Matched, order.remaining == 0);
    }

    let book = engine.book_snapshot(&MarketId::default()).await;
    if let (Some(bid), Some(ask)) = (book.bids.first(), book.asks.first()) {
        assert!(bid.price < ask.price, "book left crossed");
    }
}

#[tokio::test]
async fn replaying_a_flow_reproduces_matches() {
    let flow = random_flow(42, 200);

    let mut roots = Vec::new();
    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let (engine, store) = new_engine();
        for (who, side, amount, price) in &flow {
            submit(&engine, who, *side, *amount, *price).await;
        }
        let matches = store.matches(&MarketId::default()).await.unwrap();
        roots.push(compute_match_root(&matches));
        snapshots.push(engine.book_snapshot(&MarketId::default()).await);
    }
    assert_eq!(roots[0], roots[1]);
    assert_eq!(snapshots[0], snapshots[1]);
}

#[tokio::test]
async fn concurrent_submissions_are_serialized_per_market() {
    let (engine, store) = new_engine();
    let engine = Arc::new(engine);

    let mut tasks = Vec::new();
    for i in 0..40 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            let side = if i % 2 == 0 { OrderSide::Buy } else { OrderSide::Sell };
            engine
                .submit(OrderRequest::limit(&format!("0x{i:02x}"), side, 5, 50))
                .await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let orders = store.orders(&MarketId::default()).await.unwrap();
    let sequences: Vec<u64> = orders.iter().map(|o| o.sequence).collect();
    assert_eq!(sequences, (0..40).collect::<Vec<_>>());
    let matches = store.matches(&MarketId::default()).await.unwrap();
    assert_eq!(matches.len(), 20);
    assert!(engine.book_snapshot(&MarketId::default()).await.bids.is_empty());
}
