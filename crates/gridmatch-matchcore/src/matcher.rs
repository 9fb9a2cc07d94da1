//! The matching pass.
//!
//! One pass runs for every accepted submission. It is split in two so a
//! pass can be persisted before the book changes:
//!
//! ```text
//! plan_pass(&OrderBook, incoming) -> PassPlan   // pure, no mutation
//! PassPlan::apply(&mut OrderBook)                // after the store commit
//! ```
//!
//! The book is uncrossed between passes, so only the incoming order can
//! cross. It walks the opposite side in price-time priority and fills
//! against each resting order while the limits cross. Every fill executes
//! at the resting order's price (see [`crate::clearing`]).

use chrono::{DateTime, Utc};
use gridmatch_types::{GridmatchError, Match, MatchId, Order, OrderSide, Result};

use crate::{OrderBook, clearing::resting_price};

/// Everything one pass will change, computed against an unmodified book.
#[derive(Debug, Clone)]
pub struct PassPlan {
    /// Final state of the submitted order.
    pub incoming: Order,
    /// Resting orders that received fills, in fill order, in final state.
    pub resting_updates: Vec<Order>,
    /// Matches in execution order.
    pub matches: Vec<Match>,
    /// Match sequence to use for the next pass in this market.
    pub next_match_sequence: u64,
}

impl PassPlan {
    /// All orders whose state this pass changes, incoming order last.
    #[must_use]
    pub fn touched_orders(&self) -> Vec<Order> {
        let mut orders = self.resting_updates.clone();
        orders.push(self.incoming.clone());
        orders
    }

    /// Apply the plan to the book it was computed against.
    ///
    /// Filled resting orders leave the book, partially filled ones keep
    /// their queue position, and the incoming order rests if anything
    /// remains.
    pub fn apply(&self, book: &mut OrderBook) -> Result<()> {
        for updated in &self.resting_updates {
            if updated.is_filled() {
                book.remove_order(&updated.id)?;
            } else {
                book.replace_resting(updated.clone())?;
            }
        }
        if !self.incoming.is_filled() {
            book.insert_order(self.incoming.clone())?;
        }
        Ok(())
    }
}

/// Compute the matches `incoming` produces against `book`.
///
/// Deterministic: the same book, incoming order and match sequence yield
/// the same plan apart from timestamps.
pub fn plan_pass(
    book: &OrderBook,
    mut incoming: Order,
    next_match_sequence: u64,
    now: DateTime<Utc>,
) -> Result<PassPlan> {
    if incoming.market != book.market {
        return Err(GridmatchError::MatchingFailed {
            reason: format!(
                "order {} for market {} routed to book {}",
                incoming.id, incoming.market, book.market
            ),
        });
    }

    let mut resting_updates = Vec::new();
    let mut matches = Vec::new();
    let mut match_sequence = next_match_sequence;

    for resting in book.resting(incoming.side.opposite()) {
        if incoming.is_filled() {
            break;
        }
        let (buy, sell) = match incoming.side {
            OrderSide::Buy => (&incoming, resting),
            OrderSide::Sell => (resting, &incoming),
        };
        // Levels are visited best first, so the first non-crossing order
        // ends the pass.
        let Some(clearing) = resting_price(buy, sell) else {
            break;
        };
        let fill = incoming.remaining.min(resting.remaining);
        let m = Match {
            id: MatchId::deterministic(&book.market, match_sequence),
            market: book.market.clone(),
            sequence: match_sequence,
            buy_order_id: buy.id,
            sell_order_id: sell.id,
            buyer: buy.participant_id.clone(),
            seller: sell.participant_id.clone(),
            amount: fill,
            clearing_price: clearing.price,
            aggressor: clearing.aggressor,
            matched_at: now,
        };

        let mut updated = resting.clone();
        updated.apply_fill(fill, now)?;
        incoming.apply_fill(fill, now)?;

        resting_updates.push(updated);
        matches.push(m);
        match_sequence += 1;
    }

    Ok(PassPlan {
        incoming,
        resting_updates,
        matches,
        next_match_sequence: match_sequence,
    })
}
