//! Reservation timing configuration.

use std::time::Duration as StdDuration;

use chrono::Duration;

/// TTL and sweep cadence.
///
/// The TTL is soft: expiry is only enforced when the sweep runs, so a
/// reservation can stay Active for up to `ttl + sweep_interval` past the
/// moment it was made. See [`ReservationConfig::max_hold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationConfig {
    pub ttl: Duration,
    pub sweep_interval: StdDuration,
}

impl ReservationConfig {
    pub const DEFAULT_TTL_SECS: i64 = 10 * 60;
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
    /// Longest accepted TTL: one year.
    pub const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;
    /// Longest accepted sweep interval: one day.
    pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

    pub fn new(ttl: Duration, sweep_interval: StdDuration) -> Self {
        Self {
            ttl,
            sweep_interval,
        }
    }

    /// Upper bound on how long an untouched reservation stays Active.
    /// Saturates at [`Duration::MAX`].
    pub fn max_hold(&self) -> Duration {
        Duration::from_std(self.sweep_interval)
            .ok()
            .and_then(|interval| self.ttl.checked_add(&interval))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(Self::DEFAULT_TTL_SECS),
            sweep_interval: StdDuration::from_secs(Self::DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ReservationConfig::default();
        assert_eq!(config.ttl, Duration::minutes(10));
        assert_eq!(config.sweep_interval, StdDuration::from_secs(30));
    }

    #[test]
    fn test_max_hold_includes_sweep_drift() {
        let config = ReservationConfig::default();
        assert_eq!(config.max_hold(), Duration::seconds(630));
    }

    #[test]
    fn test_max_hold_saturates_on_huge_interval() {
        let config = ReservationConfig::new(Duration::minutes(10), StdDuration::MAX);
        assert_eq!(config.max_hold(), Duration::MAX);

        let config = ReservationConfig::new(Duration::MAX, StdDuration::from_secs(30));
        assert_eq!(config.max_hold(), Duration::MAX);
    }
}
