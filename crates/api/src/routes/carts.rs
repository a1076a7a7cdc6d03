//! Cart endpoints backed by the cart controller.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::{CartOutcome, CheckoutReport, LineResult, LoadedCart};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{Cart, Money, ProductId, UserId};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub items: Vec<CartItemResponse>,
    pub item_count: u32,
    pub total_cents: i64,
    pub total: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub reservation_id: String,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CartResponse {
    fn new(cart: &Cart, total: Money) -> Self {
        Self {
            user_id: cart.user_id.to_string(),
            items: cart
                .lines
                .values()
                .map(|line| CartItemResponse {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    reservation_id: line.reservation_id.to_string(),
                    reserved_at: line.reserved_at,
                    expires_at: line.expires_at,
                })
                .collect(),
            item_count: cart.item_count(),
            total_cents: total.cents(),
            total: total.to_string(),
            updated_at: cart.updated_at,
        }
    }

    /// Builds the response with the cart priced from the catalog.
    async fn priced(state: &AppState, cart: &Cart) -> Result<Self, ApiError> {
        let total = state.controller.total(cart).await?;
        Ok(Self::new(cart, total))
    }
}

#[derive(Serialize)]
pub struct LoadedCartResponse {
    #[serde(flatten)]
    pub cart: CartResponse,
    pub notice: Option<String>,
    pub removed: Vec<String>,
}

impl From<LoadedCart> for LoadedCartResponse {
    fn from(loaded: LoadedCart) -> Self {
        let (notice, removed) = match loaded.notice {
            Some(n) => (
                Some(n.message()),
                n.removed.iter().map(ToString::to_string).collect(),
            ),
            None => (None, Vec::new()),
        };
        Self {
            cart: CartResponse::new(&loaded.cart, loaded.total),
            notice,
            removed,
        }
    }
}

#[derive(Serialize)]
pub struct InsufficientStockResponse {
    pub error: &'static str,
    pub product_id: String,
    pub requested: u32,
    pub available: u32,
}

#[derive(Serialize)]
pub struct CheckoutLineResponse {
    pub product_id: String,
    pub reservation_id: String,
    pub quantity: u32,
    pub status: &'static str,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub complete: bool,
    pub lines: Vec<CheckoutLineResponse>,
    pub cart: CartResponse,
}

impl CheckoutResponse {
    fn new(report: CheckoutReport, cart: CartResponse) -> Self {
        Self {
            complete: report.is_complete(),
            lines: report
                .lines
                .iter()
                .map(|line| {
                    let (status, reason) = match &line.result {
                        LineResult::Committed => ("committed", None),
                        LineResult::Failed { reason } => ("failed", Some(reason.clone())),
                    };
                    CheckoutLineResponse {
                        product_id: line.product_id.to_string(),
                        reservation_id: line.reservation_id.to_string(),
                        quantity: line.quantity,
                        status,
                        reason,
                    }
                })
                .collect(),
            cart,
        }
    }
}

async fn outcome_response(state: &AppState, outcome: CartOutcome) -> Result<Response, ApiError> {
    let response = match outcome {
        CartOutcome::Updated { cart } => {
            Json(CartResponse::priced(state, &cart).await?).into_response()
        }
        CartOutcome::InsufficientStock {
            product_id,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            Json(InsufficientStockResponse {
                error: "insufficient_stock",
                product_id: product_id.to_string(),
                requested,
                available,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

// -- Handlers --

/// GET /carts/{user_id}: loads the cart, dropping lines whose reservation
/// has ended.
#[tracing::instrument(skip(state))]
pub async fn load(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<LoadedCartResponse>, ApiError> {
    let loaded = state.controller.load(&UserId::new(user_id)).await?;
    Ok(Json(loaded.into()))
}

/// POST /carts/{user_id}/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .controller
        .add(
            &UserId::new(user_id),
            &ProductId::new(req.product_id),
            req.quantity,
        )
        .await?;
    outcome_response(&state, outcome).await
}

/// PUT /carts/{user_id}/items/{product_id}
#[tracing::instrument(skip(state, req))]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((user_id, product_id)): Path<(String, String)>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .controller
        .update_quantity(
            &UserId::new(user_id),
            &ProductId::new(product_id),
            req.quantity,
        )
        .await?;
    outcome_response(&state, outcome).await
}

/// DELETE /carts/{user_id}/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((user_id, product_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .controller
        .remove(&UserId::new(user_id), &ProductId::new(product_id))
        .await?;
    Ok(Json(CartResponse::priced(&state, &cart).await?))
}

/// POST /carts/{user_id}/items/{product_id}/touch
#[tracing::instrument(skip(state))]
pub async fn touch_item(
    State(state): State<Arc<AppState>>,
    Path((user_id, product_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .controller
        .touch(&UserId::new(user_id), &ProductId::new(product_id))
        .await?;
    Ok(Json(CartResponse::priced(&state, &cart).await?))
}

/// POST /carts/{user_id}/checkout
#[tracing::instrument(skip(state))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let report = state.controller.checkout(&UserId::new(user_id)).await?;
    let cart = CartResponse::priced(&state, &report.cart).await?;
    Ok(Json(CheckoutResponse::new(report, cart)))
}

/// POST /carts/{user_id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.controller.cancel(&UserId::new(user_id)).await?;
    Ok(Json(CartResponse::priced(&state, &cart).await?))
}
