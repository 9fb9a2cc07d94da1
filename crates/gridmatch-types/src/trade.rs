//! Match records produced by the matching engine.
//!
//! A [`Match`] is the immutable record of a fill between one buy and one
//! sell order. Matches are append-only: once persisted they are never
//! updated or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MarketId, MatchId, OrderId, OrderSide, ParticipantId};

/// A fill between a buy and a sell order.
///
/// The clearing price is always the limit price of the resting order, the
/// one that was in the book first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Deterministic from market + sequence.
    pub id: MatchId,
    pub market: MarketId,
    /// Per-market match counter.
    pub sequence: u64,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer: ParticipantId,
    pub seller: ParticipantId,
    /// Executed amount, at most the smaller remaining amount of the pair.
    pub amount: u64,
    pub clearing_price: u64,
    /// Side of the later (crossing) order.
    pub aggressor: OrderSide,
    pub matched_at: DateTime<Utc>,
}

impl Match {
    /// Amount × price, saturating.
    #[must_use]
    pub fn notional(&self) -> u64 {
        self.amount.saturating_mul(self.clearing_price)
    }

    /// Whether `order_id` is one of the two sides.
    #[must_use]
    pub fn involves(&self, order_id: &OrderId) -> bool {
        self.buy_order_id == *order_id || self.sell_order_id == *order_id
    }
}

impl std::fmt::Display for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Match[{}] {} {} -> {} {} @ {}",
            self.sequence, self.market, self.seller, self.buyer, self.amount, self.clearing_price,
        )
    }
}
