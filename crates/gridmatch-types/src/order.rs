//! Order types for the GridMatch matching engine.
//!
//! Only limit buy/sell orders exist. Amounts are whole indivisible units
//! and prices are non-negative integers. Time priority is the per-market
//! arrival `sequence`, never the wall clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GridmatchError, MarketId, OrderId, ParticipantId, Result};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side this order trades against.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order.
///
/// `Matched` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PartiallyMatched,
    Matched,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Matched | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::PartiallyMatched => write!(f, "PARTIALLY_MATCHED"),
            Self::Matched => write!(f, "MATCHED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// An unvalidated trade intent as submitted by a participant.
///
/// Amount and price are signed so that out-of-range input reaches
/// validation instead of failing deserialization with an opaque message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub participant_id: ParticipantId,
    /// Falls back to the node's default market when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketId>,
    pub side: OrderSide,
    pub amount: i64,
    pub price: i64,
}

/// Checked submission values produced by [`OrderRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOrder {
    pub participant_id: ParticipantId,
    pub market: MarketId,
    pub side: OrderSide,
    pub amount: u64,
    pub limit_price: u64,
}

impl OrderRequest {
    /// Reject malformed submissions before they touch the book.
    ///
    /// # Errors
    /// [`GridmatchError::InvalidOrder`] with the specific reason.
    pub fn validate(self) -> Result<ValidOrder> {
        if self.participant_id.as_str().trim().is_empty() {
            return Err(GridmatchError::InvalidOrder {
                reason: "participant id must not be empty".into(),
            });
        }
        let market = self.market.unwrap_or_default();
        if market.as_str().trim().is_empty() {
            return Err(GridmatchError::InvalidOrder {
                reason: "market must not be empty".into(),
            });
        }
        let amount = u64::try_from(self.amount)
            .ok()
            .filter(|a| *a > 0)
            .ok_or_else(|| GridmatchError::InvalidOrder {
                reason: format!("amount must be positive, got {}", self.amount),
            })?;
        let limit_price = u64::try_from(self.price).map_err(|_| GridmatchError::InvalidOrder {
            reason: format!("price must be non-negative, got {}", self.price),
        })?;
        Ok(ValidOrder {
            participant_id: self.participant_id,
            market,
            side: self.side,
            amount,
            limit_price,
        })
    }
}

/// Core order record. Owned by the order store, mutated only by the
/// matching engine while it holds the market's writer lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub participant_id: ParticipantId,
    pub market: MarketId,
    pub side: OrderSide,
    /// Original amount.
    pub amount: u64,
    /// Amount not yet matched.
    pub remaining: u64,
    pub limit_price: u64,
    pub status: OrderStatus,
    /// Per-market arrival counter; lower means earlier.
    pub sequence: u64,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a fresh `Pending` order from validated input.
    #[must_use]
    pub fn from_valid(valid: ValidOrder, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            participant_id: valid.participant_id,
            market: valid.market,
            side: valid.side,
            amount: valid.amount,
            remaining: valid.amount,
            limit_price: valid.limit_price,
            status: OrderStatus::Pending,
            sequence,
            submitted_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining == 0
    }

    #[must_use]
    pub fn matched_amount(&self) -> u64 {
        self.amount.saturating_sub(self.remaining)
    }

    /// Reduce the remaining amount by `fill` and advance the status.
    ///
    /// # Errors
    /// [`GridmatchError::InvariantViolation`] if `fill` exceeds what remains.
    pub fn apply_fill(&mut self, fill: u64, at: DateTime<Utc>) -> Result<()> {
        if fill > self.remaining {
            return Err(GridmatchError::InvariantViolation {
                reason: format!(
                    "fill {fill} exceeds remaining {} of order {}",
                    self.remaining, self.id
                ),
            });
        }
        self.remaining -= fill;
        self.status = if self.remaining == 0 {
            OrderStatus::Matched
        } else {
            OrderStatus::PartiallyMatched
        };
        self.updated_at = at;
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: u64, amount: u64, sequence: u64) -> Self {
        Self::from_valid(
            ValidOrder {
                participant_id: ParticipantId::new(format!("0x{sequence:040x}")),
                market: MarketId::default(),
                side,
                amount,
                limit_price: price,
            },
            sequence,
        )
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl OrderRequest {
    pub fn limit(participant: &str, side: OrderSide, amount: i64, price: i64) -> Self {
        Self {
            participant_id: ParticipantId::new(participant),
            market: None,
            side,
            amount,
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_side_display() {
        assert_eq!(format!("{}", OrderSide::Buy), "BUY");
        assert_eq!(format!("{}", OrderSide::Sell), "SELL");
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn validate_rejects_non_positive_amount() {
        for amount in [0, -5] {
            let err = OrderRequest::limit("0xa", OrderSide::Buy, amount, 10)
                .validate()
                .unwrap_err();
            assert!(
                matches!(&err, GridmatchError::InvalidOrder { reason } if reason.contains("amount")),
                "Got: {err}"
            );
        }
    }

    #[test]
    fn validate_rejects_negative_price() {
        let err = OrderRequest::limit("0xa", OrderSide::Sell, 5, -1)
            .validate()
            .unwrap_err();
        assert!(matches!(&err, GridmatchError::InvalidOrder { reason } if reason.contains("price")));
    }

    #[test]
    fn validate_accepts_zero_price() {
        let valid = OrderRequest::limit("0xa", OrderSide::Sell, 5, 0)
            .validate()
            .unwrap();
        assert_eq!(valid.limit_price, 0);
        assert_eq!(valid.amount, 5);
    }

    #[test]
    fn validate_rejects_empty_participant() {
        assert!(
            OrderRequest::limit("  ", OrderSide::Buy, 1, 1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn fill_tracking() {
        let mut order = Order::dummy_limit(OrderSide::Buy, 50, 10, 0);
        assert_eq!(order.status, OrderStatus::Pending);

        order.apply_fill(4, Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyMatched);
        assert_eq!(order.matched_amount(), 4);

        order.apply_fill(6, Utc::now()).unwrap();
        assert!(order.is_filled());
        assert_eq!(order.status, OrderStatus::Matched);
    }

    #[test]
    fn overfill_is_rejected() {
        let mut order = Order::dummy_limit(OrderSide::Sell, 45, 3, 0);
        let err = order.apply_fill(4, Utc::now()).unwrap_err();
        assert!(matches!(err, GridmatchError::InvariantViolation { .. }));
        assert_eq!(order.remaining, 3);
    }

    #[test]
    fn request_deserializes_camel_case_without_market() {
        let req: OrderRequest = serde_json::from_str(
            r#"{"participantId":"0xabc","side":"buy","amount":10,"price":50}"#,
        )
        .unwrap();
        assert!(req.market.is_none());
        assert_eq!(req.side, OrderSide::Buy);
        assert_eq!(req.validate().unwrap().market, MarketId::default());
    }

    #[test]
    fn status_terminality() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::PartiallyMatched.is_terminal());
        assert!(OrderStatus::Matched.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }
}
