//! Clearing-price policy for continuous matching.
//!
//! When a buy and a sell cross, the trade executes at the limit price of
//! the **resting** order: whichever of the two entered the book first
//! (lower per-market sequence). The crossing order is the aggressor and
//! never sets the price.

use gridmatch_types::{Order, OrderSide};

/// Price and aggressor for one crossing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clearing {
    pub price: u64,
    pub aggressor: OrderSide,
}

/// Decide the execution price for a crossing `buy`/`sell` pair.
///
/// Returns `None` if the pair does not cross (`buy.limit_price <
/// sell.limit_price`).
#[must_use]
pub fn resting_price(buy: &Order, sell: &Order) -> Option<Clearing> {
    if buy.limit_price < sell.limit_price {
        return None;
    }
    // Sequences are unique per market, so exactly one side rests.
    let clearing = if buy.sequence < sell.sequence {
        Clearing {
            price: buy.limit_price,
            aggressor: OrderSide::Sell,
        }
    } else {
        Clearing {
            price: sell.limit_price,
            aggressor: OrderSide::Buy,
        }
    };
    Some(clearing)
}

#[cfg(test)]
mod tests {
    use gridmatch_types::*;

    use super::*;

    #[test]
    fn resting_buy_sets_price() {
        let buy = Order::dummy_limit(OrderSide::Buy, 50, 10, 0);
        let sell = Order::dummy_limit(OrderSide::Sell, 45, 10, 1);
        let c = resting_price(&buy, &sell).unwrap();
        assert_eq!(c.price, 50);
        assert_eq!(c.aggressor, OrderSide::Sell);
    }

    #[test]
    fn resting_sell_sets_price() {
        let sell = Order::dummy_limit(OrderSide::Sell, 45, 10, 0);
        let buy = Order::dummy_limit(OrderSide::Buy, 50, 10, 1);
        let c = resting_price(&buy, &sell).unwrap();
        assert_eq!(c.price, 45);
        assert_eq!(c.aggressor, OrderSide::Buy);
    }

    #[test]
    fn equal_prices_cross() {
        let buy = Order::dummy_limit(OrderSide::Buy, 30, 1, 3);
        let sell = Order::dummy_limit(OrderSide::Sell, 30, 1, 2);
        assert_eq!(resting_price(&buy, &sell).unwrap().price, 30);
    }

    #[test]
    fn no_cross() {
        let buy = Order::dummy_limit(OrderSide::Buy, 44, 10, 0);
        let sell = Order::dummy_limit(OrderSide::Sell, 45, 10, 1);
        assert!(resting_price(&buy, &sell).is_none());
    }
}
