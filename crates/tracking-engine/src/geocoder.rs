//! Reverse geocoding (coordinates to a human-readable address)

use crate::error::GeocodeError;
use crate::{env_flag, env_or};

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use tracking_core::GeoPosition;

/// Resolves an address for a position.
///
/// `Ok(None)` means the service answered but knows no address there.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, position: GeoPosition) -> Result<Option<String>, GeocodeError>;
}

/// Address stored when geocoding yields nothing
pub fn placeholder_address(position: GeoPosition) -> String {
    format!(
        "Unknown location ({:.6}, {:.6})",
        position.latitude, position.longitude
    )
}

/// Geocoder configuration
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("device-tracking/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_millis(3000),
        }
    }
}

impl GeocoderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            enabled: env_flag("GEOCODER_ENABLED", defaults.enabled),
            base_url: std::env::var("GEOCODER_BASE_URL").unwrap_or(defaults.base_url),
            user_agent: std::env::var("GEOCODER_USER_AGENT").unwrap_or(defaults.user_agent),
            timeout: Duration::from_millis(env_or("GEOCODER_TIMEOUT_MS", 3000)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Nominatim reverse geocoding client
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, position: GeoPosition) -> Result<Option<String>, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", position.latitude.to_string()),
                ("lon", position.longitude.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body: ReverseResponse = response.json().await?;
        debug!(found = body.display_name.is_some(), "reverse geocode answered");

        Ok(body.display_name.filter(|name| !name.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_uses_six_decimals() {
        assert_eq!(
            placeholder_address(GeoPosition::new(-1.95, 30.09)),
            "Unknown location (-1.950000, 30.090000)"
        );
    }

    #[test]
    fn test_reverse_response_without_display_name() {
        let body: ReverseResponse =
            serde_json::from_str(r#"{"error":"Unable to geocode"}"#).unwrap();
        assert!(body.display_name.is_none());

        let body: ReverseResponse =
            serde_json::from_str(r#"{"display_name":"KN 5 Rd, Kigali, Rwanda","lat":"-1.95"}"#)
                .unwrap();
        assert_eq!(body.display_name.as_deref(), Some("KN 5 Rd, Kigali, Rwanda"));
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = GeocoderConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        let geocoder = NominatimGeocoder::new(&config).unwrap();
        assert_eq!(geocoder.base_url, "http://localhost:8080");
    }
}
