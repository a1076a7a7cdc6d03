//! Cart controller for the stock reservation engine.
//!
//! Maps user cart intents (add, update, remove, touch, checkout, cancel) onto
//! [`reservation::ReservationService`] calls and keeps each user's persisted
//! cart document consistent with their Active reservations. The
//! [`sweeper`] drives the periodic expiry sweep and cart re-sync.

pub mod controller;
pub mod error;
mod locks;
pub mod report;
pub mod sweeper;

pub use controller::CartController;
pub use error::{CartError, Result};
pub use report::{
    CartOutcome, CheckoutLine, CheckoutReport, ExpiryNotice, LineResult, LoadedCart, TickReport,
};
pub use sweeper::spawn_sweeper;
