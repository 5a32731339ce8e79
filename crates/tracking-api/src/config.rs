//! API server configuration

use tracking_db::DbConfig;
use tracking_engine::{GeocoderConfig, TrackerConfig};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// REST API port
    pub api_port: u16,
    /// Enable CORS for all origins (development)
    pub cors_permissive: bool,
    /// Seed a demo zone, owner and device when running without a database
    pub demo_seed: bool,
    /// Database configuration
    pub db: DbConfig,
    /// Geofence and status windows
    pub tracker: TrackerConfig,
    /// Reverse geocoding
    pub geocoder: GeocoderConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_port: 3000,
            cors_permissive: true,
            demo_seed: true,
            db: DbConfig::default(),
            tracker: TrackerConfig::default(),
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_port = std::env::var("API_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let cors_permissive = std::env::var("CORS_PERMISSIVE")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(true);

        let demo_seed = std::env::var("DEMO_SEED")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(true);

        Self {
            api_port,
            cors_permissive,
            demo_seed,
            db: DbConfig::from_env(),
            tracker: TrackerConfig::from_env(),
            geocoder: GeocoderConfig::from_env(),
        }
    }
}
