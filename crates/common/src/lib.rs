//! Shared types for the stock reservation engine.

pub mod clock;
pub mod money;
pub mod types;

pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use money::Money;
pub use types::{ProductId, ReservationId, UserId};
