//! Cart documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProductId, Reservation, ReservationId, UserId};

/// A cart line, always mirroring one Active reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub reservation_id: ReservationId,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Reservation> for CartLine {
    fn from(r: &Reservation) -> Self {
        Self {
            product_id: r.product_id.clone(),
            quantity: r.quantity,
            reservation_id: r.id,
            reserved_at: r.reserved_at,
            expires_at: r.expires_at,
        }
    }
}

/// A user's cart snapshot, keyed by product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: UserId,
    pub lines: BTreeMap<ProductId, CartLine>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for `user_id`.
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            lines: BTreeMap::new(),
            updated_at: now,
        }
    }

    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.get(product_id)
    }

    /// Inserts or replaces the line for the reservation's product.
    pub fn upsert_line(&mut self, reservation: &Reservation) {
        self.lines
            .insert(reservation.product_id.clone(), CartLine::from(reservation));
    }

    pub fn remove_line(&mut self, product_id: &ProductId) -> Option<CartLine> {
        self.lines.remove(product_id)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.lines.values().map(|l| l.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_upsert_replaces_line_for_same_product() {
        let now = Utc::now();
        let mut cart = Cart::empty("user-1".into(), now);

        let first = Reservation::new("SKU-1".into(), "user-1".into(), 2, now, Duration::minutes(10));
        cart.upsert_line(&first);

        let mut second = first.clone();
        second.quantity = 5;
        cart.upsert_line(&second);

        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.item_count(), 5);
        assert_eq!(
            cart.line(&"SKU-1".into()).map(|l| l.reservation_id),
            Some(first.id)
        );
    }

    #[test]
    fn test_cart_json_roundtrip_keeps_lines() {
        let now = Utc::now();
        let mut cart = Cart::empty("user-1".into(), now);
        cart.upsert_line(&Reservation::new(
            "SKU-1".into(),
            "user-1".into(),
            1,
            now,
            Duration::minutes(10),
        ));

        let json = serde_json::to_value(&cart).unwrap();
        assert!(json["lines"]["SKU-1"].is_object());
        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }
}
