//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use store::{Money, Product, ProductId};

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct PutProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub price: String,
    pub stock: u32,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name,
            price_cents: p.price.cents(),
            price: p.price.to_string(),
            stock: p.stock,
        }
    }
}

/// PUT /products/{id}: creates or overwrites a catalog entry.
#[tracing::instrument(skip(state, req))]
pub async fn put(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PutProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let price = Money::from_cents(req.price_cents);
    if price.is_negative() {
        return Err(ApiError::BadRequest(format!(
            "Invalid price: {} (must not be negative)",
            req.price_cents
        )));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Product name is required".to_string()));
    }

    let product = Product::new(id, req.name, price, req.stock);
    state.catalog.put_product(product.clone()).await?;
    tracing::info!(product_id = %product.id, stock = product.stock, "product stored");

    Ok(Json(product.into()))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .catalog
        .get_product(&ProductId::new(id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    Ok(Json(product.into()))
}
