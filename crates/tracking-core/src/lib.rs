//! # Tracking Core
//!
//! Core domain models and types for the device location tracking system.
//! This crate provides the shared vocabulary used by persistence, the
//! tracking engine and the API server.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod error;
pub mod geo;

pub use error::{CoreError, CoreResult};
pub use geo::*;

// ============================================================================
// IDENTIFIERS
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a registered device
    DeviceId
);
uuid_id!(
    /// Unique identifier for a user (device owner or recording actor)
    UserId
);
uuid_id!(
    /// Unique identifier for a geographic zone
    ZoneId
);
uuid_id!(
    /// Unique identifier for a persisted location record
    LocationRecordId
);
uuid_id!(
    /// Unique identifier for an alert
    AlertId
);

// ============================================================================
// DIRECTORY MODELS
// ============================================================================

/// A registered tracking device, as seen through the device directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub imei: String,
    pub serial_number: Option<String>,
    /// Owning user; used for owner-scoped alert queries
    pub owner_id: Option<UserId>,
    /// Assigned boundary
    pub zone_id: Option<ZoneId>,
    pub last_reported_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(imei: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(),
            imei: imei.into(),
            serial_number: None,
            owner_id: None,
            zone_id: None,
            last_reported_at: None,
        }
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn assigned_to(mut self, zone_id: ZoneId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }
}

/// A user known to the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub display_name: String,
}

impl User {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            display_name: display_name.into(),
        }
    }
}

/// Circular boundary around a named location.
///
/// The radius is not stored on the zone; it comes from tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoZone {
    pub id: ZoneId,
    pub name: String,
    pub center_latitude: Option<f64>,
    pub center_longitude: Option<f64>,
}

impl GeoZone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ZoneId::new(),
            name: name.into(),
            center_latitude: None,
            center_longitude: None,
        }
    }

    pub fn with_center(mut self, latitude: f64, longitude: f64) -> Self {
        self.center_latitude = Some(latitude);
        self.center_longitude = Some(longitude);
        self
    }

    /// Center of the zone; `None` unless both coordinates are present
    pub fn center(&self) -> Option<GeoPosition> {
        match (self.center_latitude, self.center_longitude) {
            (Some(lat), Some(lng)) => Some(GeoPosition::new(lat, lng)),
            _ => None,
        }
    }
}

// ============================================================================
// LOCATION MODELS
// ============================================================================

/// Input for appending a location observation to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocationRecord {
    pub device_id: DeviceId,
    pub latitude: f64,
    pub longitude: f64,
    /// Assigned by the ledger when absent
    pub timestamp: Option<DateTime<Utc>>,
    pub recorded_address: Option<String>,
    pub recorded_by: Option<UserId>,
}

impl NewLocationRecord {
    pub fn new(device_id: DeviceId, position: GeoPosition) -> Self {
        Self {
            device_id,
            latitude: position.latitude,
            longitude: position.longitude,
            timestamp: None,
            recorded_address: None,
            recorded_by: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.recorded_address = address;
        self
    }

    pub fn recorded_by(mut self, user: Option<UserId>) -> Self {
        self.recorded_by = user;
        self
    }

    /// Materialize into a stored record, filling the identifier and timestamp
    pub fn into_record(self, now: DateTime<Utc>) -> LocationRecord {
        LocationRecord {
            id: LocationRecordId::new(),
            device_id: self.device_id,
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: self.timestamp.unwrap_or(now),
            recorded_address: self.recorded_address,
            recorded_by: self.recorded_by,
            alerts: Vec::new(),
        }
    }
}

/// One timestamped, immutable observation of a device's coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub id: LocationRecordId,
    pub device_id: DeviceId,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub recorded_address: Option<String>,
    pub recorded_by: Option<UserId>,
    /// Alerts raised by this report. Never persisted with the record.
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl LocationRecord {
    pub fn position(&self) -> GeoPosition {
        GeoPosition::new(self.latitude, self.longitude)
    }

    pub fn with_alerts(mut self, alerts: Vec<Alert>) -> Self {
        self.alerts = alerts;
        self
    }
}

/// Online/last-seen summary derived from a device's latest record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

impl DeviceStatus {
    pub fn never_reported(device_id: DeviceId) -> Self {
        Self {
            device_id,
            online: false,
            last_seen: None,
            latitude: None,
            longitude: None,
            address: None,
        }
    }

    pub fn from_latest(record: &LocationRecord, online: bool) -> Self {
        Self {
            device_id: record.device_id,
            online,
            last_seen: Some(record.timestamp),
            latitude: Some(record.latitude),
            longitude: Some(record.longitude),
            address: record.recorded_address.clone(),
        }
    }
}

// ============================================================================
// ALERT MODELS
// ============================================================================

/// Kind of alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    GeofenceViolation,
    MovementDetected,
    LowBattery,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [
        AlertKind::GeofenceViolation,
        AlertKind::MovementDetected,
        AlertKind::LowBattery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::GeofenceViolation => "GEOFENCE_VIOLATION",
            AlertKind::MovementDetected => "MOVEMENT_DETECTED",
            AlertKind::LowBattery => "LOW_BATTERY",
        }
    }

    /// Key used for this kind in alert statistics
    pub fn statistics_key(&self) -> &'static str {
        match self {
            AlertKind::GeofenceViolation => "geofence",
            AlertKind::MovementDetected => "movement",
            AlertKind::LowBattery => "battery",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::invalid_input(format!("unknown alert type: {s}")))
    }
}

/// Input for creating an alert
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub device_id: DeviceId,
    pub message: String,
    pub kind: AlertKind,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Location record whose report raised this alert, if any
    pub location_record_id: Option<LocationRecordId>,
}

impl NewAlert {
    pub fn new(device_id: DeviceId, kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            device_id,
            message: message.into(),
            kind,
            latitude: None,
            longitude: None,
            location_record_id: None,
        }
    }

    pub fn at_position(mut self, position: GeoPosition) -> Self {
        self.latitude = Some(position.latitude);
        self.longitude = Some(position.longitude);
        self
    }

    pub fn with_coordinates(mut self, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn caused_by(mut self, record_id: LocationRecordId) -> Self {
        self.location_record_id = Some(record_id);
        self
    }

    /// Reject blank messages and half-specified or out-of-range coordinates
    pub fn validate(&self) -> CoreResult<()> {
        if self.message.trim().is_empty() {
            return Err(CoreError::invalid_input("alert message must not be blank"));
        }
        match (self.latitude, self.longitude) {
            (None, None) => Ok(()),
            (Some(lat), Some(lng)) if GeoPosition::new(lat, lng).is_valid() => Ok(()),
            (Some(lat), Some(lng)) => Err(CoreError::invalid_position(lat, lng)),
            _ => Err(CoreError::invalid_input(
                "latitude and longitude must be given together",
            )),
        }
    }
}

/// Persisted alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    pub device_id: DeviceId,
    pub message: String,
    #[serde(rename = "alertType")]
    pub kind: AlertKind,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_record_id: Option<LocationRecordId>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Timestamps are kept at millisecond precision, the resolution alerts are stored at
    pub fn from_new(new: NewAlert, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::new(),
            device_id: new.device_id,
            message: new.message,
            kind: new.kind,
            latitude: new.latitude,
            longitude: new.longitude,
            location_record_id: new.location_record_id,
            created_at: created_at.trunc_subsecs(3),
            resolved: false,
            resolved_at: None,
        }
    }

    /// Mark resolved. Re-resolving refreshes the timestamp.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(at.trunc_subsecs(3));
    }
}

/// Alert counts keyed by category: `total`, `unresolved` and one key per kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertStatistics(pub BTreeMap<String, u64>);

impl AlertStatistics {
    pub const TOTAL: &'static str = "total";
    pub const UNRESOLVED: &'static str = "unresolved";

    pub fn from_alerts<'a>(alerts: impl IntoIterator<Item = &'a Alert>) -> Self {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        counts.insert(Self::TOTAL.into(), 0);
        counts.insert(Self::UNRESOLVED.into(), 0);
        for kind in AlertKind::ALL {
            counts.insert(kind.statistics_key().into(), 0);
        }

        for alert in alerts {
            *counts.entry(Self::TOTAL.into()).or_default() += 1;
            if !alert.resolved {
                *counts.entry(Self::UNRESOLVED.into()).or_default() += 1;
            }
            *counts.entry(alert.kind.statistics_key().into()).or_default() += 1;
        }

        Self(counts)
    }

    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
