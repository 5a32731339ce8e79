//! # Tracking Engine - Ingestion & Alerting
//!
//! Turns inbound location reports into durable history and geofence alerts.
//!
//! ## Components
//! - [`GeofenceEvaluator`]: circular boundary check around a zone center
//! - [`AlertEmitter`]: alert creation, resolution and owner-scoped queries
//! - [`Geocoder`]: optional reverse geocoding, degraded to a placeholder on failure
//! - [`TrackingEngine`]: orchestrates a report from device lookup to alert correlation

pub mod alerts;
pub mod engine;
pub mod error;
pub mod geocoder;
pub mod geofence;

pub use alerts::AlertEmitter;
pub use engine::{LocationReport, TrackingEngine};
pub use error::{GeocodeError, TrackingError, TrackingResult};
pub use geocoder::{Geocoder, GeocoderConfig, NominatimGeocoder, placeholder_address};
pub use geofence::{GeofenceEvaluator, GeofenceViolation};

use std::str::FromStr;

/// Tracking engine configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Geofence radius around a zone center
    pub geofence_radius_km: f64,
    /// Skip a new geofence alert while one is still unresolved for the device
    pub suppress_repeat_violations: bool,
    /// A device is online if its latest record is younger than this
    pub online_window_secs: u64,
    /// Window used by recent-history queries when the caller gives none
    pub default_recent_hours: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            geofence_radius_km: 0.5,
            suppress_repeat_violations: false,
            online_window_secs: 300,
            default_recent_hours: 24,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            geofence_radius_km: env_or("GEOFENCE_RADIUS_KM", defaults.geofence_radius_km),
            suppress_repeat_violations: env_flag(
                "SUPPRESS_REPEAT_VIOLATIONS",
                defaults.suppress_repeat_violations,
            ),
            online_window_secs: env_or("ONLINE_WINDOW_SECS", defaults.online_window_secs),
            default_recent_hours: env_or("DEFAULT_RECENT_HOURS", defaults.default_recent_hours),
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or malformed
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.geofence_radius_km, 0.5);
        assert!(!config.suppress_repeat_violations);
        assert_eq!(config.online_window_secs, 300);
        assert_eq!(config.default_recent_hours, 24);
    }

    #[test]
    fn test_env_or_falls_back_on_missing_key() {
        let value: f64 = env_or("TRACKING_ENGINE_TEST_UNSET_KEY", 1.25);
        assert_eq!(value, 1.25);
        assert!(env_flag("TRACKING_ENGINE_TEST_UNSET_FLAG", true));
    }
}
