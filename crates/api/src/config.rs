//! Application configuration loaded from environment variables.

use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use reservation::ReservationConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `RESERVATION_TTL_SECS` — reservation lifetime, at most one year (default: `600`)
/// - `SWEEP_INTERVAL_SECS` — expiry sweep period, at most one day (default: `30`)
/// - `DATABASE_URL` — PostgreSQL URL; in-memory stores when unset
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub reservation_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Unparsable or
    /// out-of-range values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            reservation_ttl_secs: parse_within(
                &lookup,
                "RESERVATION_TTL_SECS",
                defaults.reservation_ttl_secs,
                1..=ReservationConfig::MAX_TTL_SECS,
            ),
            sweep_interval_secs: parse_within(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
                1..=ReservationConfig::MAX_SWEEP_INTERVAL_SECS,
            ),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reservation(&self) -> ReservationConfig {
        ReservationConfig::new(
            chrono::Duration::seconds(self.reservation_ttl_secs),
            StdDuration::from_secs(self.sweep_interval_secs),
        )
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_within<T: FromStr + PartialOrd>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    range: RangeInclusive<T>,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .filter(|v| range.contains(v))
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            reservation_ttl_secs: ReservationConfig::DEFAULT_TTL_SECS,
            sweep_interval_secs: ReservationConfig::DEFAULT_SWEEP_INTERVAL_SECS,
            database_url: None,
            database_max_connections: 5,
        }
    }
}
