//! Reservation lookup endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use store::{Reservation, ReservationId};

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ReservationResponse {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub quantity: u32,
    pub status: String,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            product_id: r.product_id.to_string(),
            user_id: r.user_id.to_string(),
            quantity: r.quantity,
            status: r.status.to_string(),
            reserved_at: r.reserved_at,
            expires_at: r.expires_at,
        }
    }
}

/// GET /reservations/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let id: ReservationId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    let reservation = state.reservations().get(id).await?;
    Ok(Json(reservation.into()))
}
