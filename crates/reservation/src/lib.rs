//! Stock reservation engine core.
//!
//! This crate provides:
//! - [`ReservationService`]: the per-reservation state machine
//!   (Active → Committed | Released | Expired) on top of the catalog and ledger
//! - [`ReservationConfig`]: TTL and sweep cadence
//! - [`ReservationError`]: the error taxonomy surfaced to callers
//!
//! Stock follows a decrement-on-reserve model: catalog stock is reduced when a
//! reservation is created and restored when it is released or expires. A
//! commit makes the deduction permanent without touching stock.

pub mod config;
pub mod error;
pub mod service;

pub use config::ReservationConfig;
pub use error::{ReservationError, Result};
pub use service::{ChangeOutcome, ReservationService, ReserveOutcome, SweepReport};
