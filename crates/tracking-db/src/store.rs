//! Persistence ports consumed by the tracking engine
//!
//! Each port has an in-memory adapter (see [`crate::memory`]) and a
//! ScyllaDB adapter (see [`crate::repository`]).

use crate::DbResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracking_core::{
    Alert, AlertId, Device, DeviceId, GeoZone, LocationRecord, LocationRecordId,
    NewLocationRecord, User, UserId, ZoneId,
};

/// Append-only store of location records per device
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LocationLedger: Send + Sync {
    /// Persist a record, assigning its identifier and, when absent, its timestamp
    async fn append(&self, record: NewLocationRecord) -> DbResult<LocationRecord>;

    /// Most recent record by timestamp
    async fn latest(&self, device_id: &DeviceId) -> DbResult<Option<LocationRecord>>;

    /// Records with `from <= timestamp <= to`, ascending. Missing bounds are open.
    async fn range(
        &self,
        device_id: &DeviceId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<LocationRecord>>;

    /// Records strictly newer than `instant`, descending
    async fn since(
        &self,
        device_id: &DeviceId,
        instant: DateTime<Utc>,
    ) -> DbResult<Vec<LocationRecord>>;

    /// Full history, newest first
    async fn all_descending(&self, device_id: &DeviceId) -> DbResult<Vec<LocationRecord>>;
}

/// Durable alert records
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert(&self, alert: Alert) -> DbResult<Alert>;

    async fn get(&self, alert_id: &AlertId) -> DbResult<Option<Alert>>;

    /// Overwrite a previously inserted alert
    async fn update(&self, alert: Alert) -> DbResult<Alert>;

    /// Returns false when no alert had this id
    async fn delete(&self, alert_id: &AlertId) -> DbResult<bool>;

    /// All alerts of a device, newest first
    async fn list_by_device(&self, device_id: &DeviceId) -> DbResult<Vec<Alert>>;

    /// Alerts raised by the report that produced this location record
    async fn list_by_location_record(&self, record_id: &LocationRecordId)
    -> DbResult<Vec<Alert>>;

    /// Every alert, newest first
    async fn list_all(&self) -> DbResult<Vec<Alert>>;
}

/// Lookup surface of the externally owned device/user/zone registry
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn find_device(&self, device_id: &DeviceId) -> DbResult<Option<Device>>;

    async fn find_device_by_imei(&self, imei: &str) -> DbResult<Option<Device>>;

    async fn find_user(&self, user_id: &UserId) -> DbResult<Option<User>>;

    async fn find_zone(&self, zone_id: &ZoneId) -> DbResult<Option<GeoZone>>;

    async fn devices_owned_by(&self, owner_id: &UserId) -> DbResult<Vec<Device>>;

    /// Advisory telemetry; last writer wins
    async fn record_last_reported(&self, device_id: &DeviceId, at: DateTime<Utc>)
    -> DbResult<()>;
}
