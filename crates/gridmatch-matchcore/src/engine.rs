//! The matching engine.
//!
//! Each market has one logical writer: a `tokio::sync::Mutex` around its
//! book and counters, held for the whole of one pass (plan, persist,
//! apply, publish). Submissions for the same market never interleave;
//! different markets never contend.
//!
//! A pass is persisted before the book changes. If the store refuses the
//! commit, the book and counters are left exactly as they were.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use gridmatch_types::{
    EventPublisher, FeedEvent, GridmatchError, Match, MarketId, Order, OrderId, OrderRequest,
    OrderStatus, Result,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::determinism::compute_match_root;
use crate::matcher::plan_pass;
use crate::orderbook::{BookSnapshot, OrderBook};
use crate::store::{OrderStore, PassCommit};

/// Result of a submission: the order in its post-pass state and the
/// matches the pass produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHandle {
    pub order: Order,
    pub matches: Vec<Match>,
}

#[derive(Debug)]
struct MarketState {
    book: OrderBook,
    next_sequence: u64,
    next_match_sequence: u64,
}

impl MarketState {
    fn new(market: MarketId) -> Self {
        Self {
            book: OrderBook::new(market),
            next_sequence: 0,
            next_match_sequence: 0,
        }
    }
}

/// Continuous double-auction engine over any number of markets.
pub struct MatchingEngine {
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    default_market: MarketId,
    markets: DashMap<MarketId, Arc<Mutex<MarketState>>>,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn OrderStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
            default_market: MarketId::default(),
            markets: DashMap::new(),
        }
    }

    /// Market used for submissions that name none.
    #[must_use]
    pub fn with_default_market(mut self, market: MarketId) -> Self {
        self.default_market = market;
        self
    }

    /// Rebuild every market's book from the store.
    ///
    /// Open orders are re-inserted in sequence order and both counters
    /// resume after the highest persisted value, so priority and match ids
    /// continue exactly where the previous process stopped.
    pub async fn restore(
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self> {
        let engine = Self::new(Arc::clone(&store), publisher);
        for market in store.markets().await? {
            let orders = store.orders(&market).await?;
            let matches = store.matches(&market).await?;

            let mut state = MarketState::new(market.clone());
            for order in orders.iter().filter(|o| !o.status.is_terminal()) {
                state.book.insert_order(order.clone())?;
            }
            if let (Some(bid), Some(ask)) = (state.book.best_bid(), state.book.best_ask()) {
                if bid >= ask {
                    return Err(GridmatchError::StorageCorrupted(format!(
                        "restored book for {market} is crossed (bid {bid} >= ask {ask})"
                    )));
                }
            }
            state.next_sequence = orders.iter().map(|o| o.sequence + 1).max().unwrap_or(0);
            state.next_match_sequence =
                matches.iter().map(|m| m.sequence + 1).max().unwrap_or(0);

            info!(
                market = %market,
                open_orders = state.book.order_count(),
                next_sequence = state.next_sequence,
                "Restored order book"
            );
            engine.markets.insert(market, Arc::new(Mutex::new(state)));
        }
        Ok(engine)
    }

    fn market(&self, market: &MarketId) -> Arc<Mutex<MarketState>> {
        Arc::clone(
            self.markets
                .entry(market.clone())
                .or_insert_with(|| Arc::new(Mutex::new(MarketState::new(market.clone()))))
                .value(),
        )
    }

    /// Validate, sequence and match one order.
    ///
    /// # Errors
    /// `InvalidOrder` for malformed input; any store error, in which case no
    /// state has changed.
    pub async fn submit(&self, mut request: OrderRequest) -> Result<OrderHandle> {
        if request.market.is_none() {
            request.market = Some(self.default_market.clone());
        }
        let valid = request.validate()?;
        let cell = self.market(&valid.market);
        let mut state = cell.lock().await;

        let order = Order::from_valid(valid, state.next_sequence);
        let plan = plan_pass(&state.book, order, state.next_match_sequence, Utc::now())?;

        self.store
            .commit_pass(PassCommit {
                orders: plan.touched_orders(),
                matches: plan.matches.clone(),
            })
            .await
            .inspect_err(|e| {
                error!(market = %plan.incoming.market, order_id = %plan.incoming.id, error = %e, "Pass commit failed");
            })?;

        plan.apply(&mut state.book)?;
        state.next_sequence += 1;
        state.next_match_sequence = plan.next_match_sequence;

        if !plan.matches.is_empty() {
            debug!(
                market = %plan.incoming.market,
                matches = plan.matches.len(),
                match_root = %hex::encode(compute_match_root(&plan.matches)),
                "Matching pass committed"
            );
        }
        // Still under the writer lock, so subscribers see matches in
        // sequence order.
        for m in &plan.matches {
            self.publisher.publish(&FeedEvent::Match(m.clone()));
        }
        drop(state);

        info!(
            order_id = %plan.incoming.id,
            market = %plan.incoming.market,
            side = %plan.incoming.side,
            status = %plan.incoming.status,
            matches = plan.matches.len(),
            "Order accepted"
        );
        Ok(OrderHandle {
            order: plan.incoming,
            matches: plan.matches,
        })
    }

    /// Cancel an open order.
    ///
    /// # Errors
    /// `OrderNotFound` if the order is unknown or already terminal.
    pub async fn cancel(&self, order_id: &OrderId) -> Result<Order> {
        let stored = self
            .store
            .order(order_id)
            .await?
            .ok_or(GridmatchError::OrderNotFound(*order_id))?;
        if stored.status.is_terminal() {
            return Err(GridmatchError::OrderNotFound(*order_id));
        }

        let cell = self.market(&stored.market);
        let mut state = cell.lock().await;
        // Re-read under the lock: a pass may have filled it meanwhile.
        let mut cancelled = state
            .book
            .get(order_id)
            .cloned()
            .ok_or(GridmatchError::OrderNotFound(*order_id))?;
        cancelled.status = OrderStatus::Cancelled;
        cancelled.updated_at = Utc::now();

        self.store
            .commit_pass(PassCommit {
                orders: vec![cancelled.clone()],
                matches: Vec::new(),
            })
            .await?;
        state.book.remove_order(order_id)?;

        info!(order_id = %order_id, market = %cancelled.market, "Order cancelled");
        Ok(cancelled)
    }

    pub async fn order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.store.order(order_id).await
    }

    /// Aggregated depth of a market's book; empty for unknown markets.
    pub async fn book_snapshot(&self, market: &MarketId) -> BookSnapshot {
        let Some(cell) = self.markets.get(market).map(|c| Arc::clone(c.value())) else {
            return BookSnapshot::empty(market.clone());
        };
        let state = cell.lock().await;
        state.book.snapshot()
    }

    #[must_use]
    pub fn default_market(&self) -> &MarketId {
        &self.default_market
    }
}
