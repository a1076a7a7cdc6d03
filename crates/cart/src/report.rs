//! Values returned to callers of the cart controller.

use std::fmt;

use common::{Money, ProductId, ReservationId, UserId};
use serde::Serialize;
use store::Cart;

/// Outcome of a cart mutation that may run out of stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CartOutcome {
    /// The mutation was applied; this is the persisted cart.
    Updated { cart: Cart },
    /// Not enough stock. The cart was left untouched.
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
}

impl CartOutcome {
    pub fn cart(&self) -> Option<&Cart> {
        match self {
            CartOutcome::Updated { cart } => Some(cart),
            CartOutcome::InsufficientStock { .. } => None,
        }
    }
}

/// Lines dropped from a cart because their reservation is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryNotice {
    pub user_id: UserId,
    pub removed: Vec<ProductId>,
}

impl ExpiryNotice {
    /// User-facing text, e.g. "2 items removed, reservation expired".
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExpiryNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.removed.len() {
            1 => write!(f, "1 item removed, reservation expired"),
            n => write!(f, "{n} items removed, reservation expired"),
        }
    }
}

/// A cart read at session start, after dropping dead lines.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedCart {
    pub cart: Cart,
    /// Sum of price times quantity over the remaining lines.
    pub total: Money,
    pub notice: Option<ExpiryNotice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineResult {
    Committed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub reservation_id: ReservationId,
    pub quantity: u32,
    pub result: LineResult,
}

/// Per-line result of a checkout.
///
/// Committed lines are not rolled back when a later line fails. Failed lines
/// remain in `cart`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReport {
    pub lines: Vec<CheckoutLine>,
    pub cart: Cart,
}

impl CheckoutReport {
    pub fn committed(&self) -> impl Iterator<Item = &CheckoutLine> {
        self.lines
            .iter()
            .filter(|l| l.result == LineResult::Committed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckoutLine> {
        self.lines
            .iter()
            .filter(|l| l.result != LineResult::Committed)
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Result of one controller tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub expired: usize,
    /// Rows the sweep could not expire plus carts that could not be re-synced.
    pub failed: usize,
    pub notices: Vec<ExpiryNotice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_message() {
        let one = ExpiryNotice {
            user_id: UserId::new("u1"),
            removed: vec![ProductId::new("a")],
        };
        assert_eq!(one.message(), "1 item removed, reservation expired");

        let two = ExpiryNotice {
            user_id: UserId::new("u1"),
            removed: vec![ProductId::new("a"), ProductId::new("b")],
        };
        assert_eq!(two.message(), "2 items removed, reservation expired");
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = CartOutcome::InsufficientStock {
            product_id: ProductId::new("SKU-001"),
            requested: 3,
            available: 1,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "insufficient_stock");
        assert_eq!(json["available"], 1);
    }
}
