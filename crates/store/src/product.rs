use serde::{Deserialize, Serialize};

use crate::{Money, ProductId};

/// A catalog product.
///
/// `stock` is the authoritative *available* count, already net of every
/// Active reservation. It is only changed by the catalog's conditional
/// decrement, its increment, and authoritative catalog writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
}

impl Product {
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            stock,
        }
    }
}
