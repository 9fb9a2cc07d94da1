//! The order book for a single market.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<u64>, PriceLevel>`, highest price first
//! - **Asks** (sells): `BTreeMap<u64, PriceLevel>`, lowest price first
//!
//! Within a level orders keep arrival order, so iterating a side yields
//! strict price-time priority. An auxiliary `HashMap<OrderId, (side, price)>`
//! enables O(log N) cancellation.
//!
//! The book only ever holds open orders with `remaining > 0`, and after every
//! committed pass it is uncrossed (`best_bid < best_ask`).

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use gridmatch_types::{GridmatchError, MarketId, Order, OrderId, OrderSide, Result};
use serde::{Deserialize, Serialize};

use crate::price_level::PriceLevel;

/// The order book for a single market.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub market: MarketId,
    bids: BTreeMap<Reverse<u64>, PriceLevel>,
    asks: BTreeMap<u64, PriceLevel>,
    index: HashMap<OrderId, (OrderSide, u64)>,
}

impl OrderBook {
    #[must_use]
    pub fn new(market: MarketId) -> Self {
        Self {
            market,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Rest an order at its limit price, behind everything already there.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(GridmatchError::DuplicateOrder(order.id));
        }
        if order.remaining == 0 || order.status.is_terminal() {
            return Err(GridmatchError::InvariantViolation {
                reason: format!("order {} is not open and cannot rest", order.id),
            });
        }

        let price = order.limit_price;
        self.index.insert(order.id, (order.side, price));

        match order.side {
            OrderSide::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
            OrderSide::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
        }
        Ok(())
    }

    // =================================================================
    // Removal / update
    // =================================================================

    /// Remove an order by ID, dropping its level if it becomes empty.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(GridmatchError::OrderNotFound(*order_id))?;

        let order = match side {
            OrderSide::Buy => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .ok_or(GridmatchError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(GridmatchError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                order
            }
            OrderSide::Sell => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .ok_or(GridmatchError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(GridmatchError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                order
            }
        };

        Ok(order)
    }

    /// Overwrite a resting order in place, keeping its queue position.
    ///
    /// Side and price must be unchanged; a filled order must be removed
    /// instead.
    pub fn replace_resting(&mut self, updated: Order) -> Result<()> {
        let (side, price) = *self
            .index
            .get(&updated.id)
            .ok_or(GridmatchError::OrderNotFound(updated.id))?;
        if side != updated.side || price != updated.limit_price || updated.remaining == 0 {
            return Err(GridmatchError::InvariantViolation {
                reason: format!("order {} cannot be replaced in place", updated.id),
            });
        }
        let level = match side {
            OrderSide::Buy => self.bids.get_mut(&Reverse(price)),
            OrderSide::Sell => self.asks.get_mut(&price),
        };
        let slot = level
            .and_then(|l| l.get_mut(&updated.id))
            .ok_or(GridmatchError::OrderNotFound(updated.id))?;
        *slot = updated;
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Best (highest) bid price.
    #[must_use]
    pub fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price.
    #[must_use]
    pub fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(order_id)?;
        let level = match side {
            OrderSide::Buy => self.bids.get(&Reverse(*price)),
            OrderSide::Sell => self.asks.get(price),
        }?;
        level.orders.iter().find(|o| o.id == *order_id)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // =================================================================
    // Iteration (for the matcher)
    // =================================================================

    /// Iterate bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Iterate ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Resting orders of one side in strict price-time priority.
    pub fn resting(&self, side: OrderSide) -> Box<dyn Iterator<Item = &Order> + '_> {
        match side {
            OrderSide::Buy => Box::new(self.bids.values().flat_map(|l| l.orders.iter())),
            OrderSide::Sell => Box::new(self.asks.values().flat_map(|l| l.orders.iter())),
        }
    }

    /// Aggregated per-level view, best first on each side.
    #[must_use]
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            market: self.market.clone(),
            bids: self.bid_levels().map(LevelSummary::from).collect(),
            asks: self.ask_levels().map(LevelSummary::from).collect(),
        }
    }
}

/// Aggregated depth of one price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSummary {
    pub price: u64,
    /// Sum of remaining amounts.
    pub amount: u64,
    pub orders: usize,
}

impl From<&PriceLevel> for LevelSummary {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price,
            amount: level.total_remaining(),
            orders: level.len(),
        }
    }
}

/// Point-in-time view of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub market: MarketId,
    pub bids: Vec<LevelSummary>,
    pub asks: Vec<LevelSummary>,
}

impl BookSnapshot {
    #[must_use]
    pub fn empty(market: MarketId) -> Self {
        Self {
            market,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }
}
