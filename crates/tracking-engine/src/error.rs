//! Engine error types

use thiserror::Error;
use tracking_core::CoreError;
use tracking_db::DbError;

/// Failure of a tracking or alerting operation
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Persistence(#[from] DbError),
}

impl TrackingError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Core(e) => e.is_not_found(),
            Self::Persistence(DbError::NotFound(_)) => true,
            Self::Persistence(_) => false,
        }
    }

    /// Stable label for failure metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Core(CoreError::DeviceNotFound(_) | CoreError::DeviceNotFoundByImei(_)) => {
                "device_not_found"
            }
            Self::Core(CoreError::UserNotFound(_)) => "user_not_found",
            Self::Core(CoreError::AlertNotFound(_)) => "alert_not_found",
            Self::Core(CoreError::NoLocationRecorded(_)) => "no_location",
            Self::Core(CoreError::InvalidPosition { .. } | CoreError::InvalidInput(_)) => {
                "invalid_input"
            }
            Self::Persistence(_) => "persistence",
        }
    }
}

pub type TrackingResult<T> = Result<T, TrackingError>;

/// Reverse geocoding failure. Never surfaced to report callers.
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Geocoder request failed: {0}")]
    Request(String),

    #[error("Geocoder returned status {0}")]
    Status(u16),

    #[error("Geocoder response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}
