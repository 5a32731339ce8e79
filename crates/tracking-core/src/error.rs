//! Error types for the tracking core

use thiserror::Error;

/// Core error type for location tracking
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device not found with IMEI: {0}")]
    DeviceNotFoundByImei(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    #[error("No location recorded for device: {0}")]
    NoLocationRecorded(String),

    #[error("Invalid position: latitude={lat}, longitude={lng}")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub fn device_not_found(id: impl ToString) -> Self {
        Self::DeviceNotFound(id.to_string())
    }

    pub fn device_not_found_by_imei(imei: impl Into<String>) -> Self {
        Self::DeviceNotFoundByImei(imei.into())
    }

    pub fn user_not_found(id: impl ToString) -> Self {
        Self::UserNotFound(id.to_string())
    }

    pub fn alert_not_found(id: impl ToString) -> Self {
        Self::AlertNotFound(id.to_string())
    }

    pub fn no_location_recorded(id: impl ToString) -> Self {
        Self::NoLocationRecorded(id.to_string())
    }

    pub fn invalid_position(lat: f64, lng: f64) -> Self {
        Self::InvalidPosition { lat, lng }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for every variant that names a missing entity
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_)
                | Self::DeviceNotFoundByImei(_)
                | Self::UserNotFound(_)
                | Self::AlertNotFound(_)
                | Self::NoLocationRecorded(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
