//! HTTP route handlers.

pub mod carts;
pub mod health;
pub mod metrics;
pub mod products;
pub mod reservations;

use std::sync::Arc;

use cart::CartController;
use reservation::ReservationService;
use store::CatalogStore;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub controller: Arc<CartController>,
    pub catalog: Arc<dyn CatalogStore>,
    /// `"memory"` or `"postgres"`, reported by `/health`.
    pub backend: &'static str,
}

impl AppState {
    pub fn reservations(&self) -> &ReservationService {
        self.controller.reservations()
    }
}
