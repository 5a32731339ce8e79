//! In-memory adapters
//!
//! Used for tests and for running the server without a database. State is
//! sharded per key with `DashMap`, so reports for different devices never
//! contend on a shared lock.

use crate::store::{AlertStore, DeviceDirectory, LocationLedger};
use crate::{DbError, DbResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use tracking_core::{
    Alert, AlertId, Device, DeviceId, GeoZone, LocationRecord, LocationRecordId,
    NewLocationRecord, User, UserId, ZoneId,
};

// ============================================================================
// LOCATION LEDGER
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: DashMap<DeviceId, Vec<LocationRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all devices
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, device_id: &DeviceId) -> Vec<LocationRecord> {
        self.records
            .get(device_id)
            .map(|records| records.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LocationLedger for MemoryLedger {
    async fn append(&self, record: NewLocationRecord) -> DbResult<LocationRecord> {
        let record = record.into_record(Utc::now());
        self.records
            .entry(record.device_id)
            .or_default()
            .push(record.clone());
        debug!(device_id = %record.device_id, record_id = %record.id, "location appended");
        Ok(record)
    }

    async fn latest(&self, device_id: &DeviceId) -> DbResult<Option<LocationRecord>> {
        Ok(self.records.get(device_id).and_then(|records| {
            records
                .value()
                .iter()
                .max_by_key(|record| record.timestamp)
                .cloned()
        }))
    }

    async fn range(
        &self,
        device_id: &DeviceId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<LocationRecord>> {
        let mut records: Vec<LocationRecord> = self
            .snapshot(device_id)
            .into_iter()
            .filter(|r| from.is_none_or(|from| r.timestamp >= from))
            .filter(|r| to.is_none_or(|to| r.timestamp <= to))
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn since(
        &self,
        device_id: &DeviceId,
        instant: DateTime<Utc>,
    ) -> DbResult<Vec<LocationRecord>> {
        let mut records: Vec<LocationRecord> = self
            .snapshot(device_id)
            .into_iter()
            .filter(|r| r.timestamp > instant)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn all_descending(&self, device_id: &DeviceId) -> DbResult<Vec<LocationRecord>> {
        let mut records = self.snapshot(device_id);
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

// ============================================================================
// ALERT STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: DashMap<AlertId, Alert>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    fn collect_newest_first(&self, filter: impl Fn(&Alert) -> bool) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn insert(&self, alert: Alert) -> DbResult<Alert> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    async fn get(&self, alert_id: &AlertId) -> DbResult<Option<Alert>> {
        Ok(self.alerts.get(alert_id).map(|a| a.value().clone()))
    }

    async fn update(&self, alert: Alert) -> DbResult<Alert> {
        match self.alerts.get_mut(&alert.id) {
            Some(mut existing) => {
                *existing = alert.clone();
                Ok(alert)
            }
            None => Err(DbError::not_found(format!("alert {}", alert.id))),
        }
    }

    async fn delete(&self, alert_id: &AlertId) -> DbResult<bool> {
        Ok(self.alerts.remove(alert_id).is_some())
    }

    async fn list_by_device(&self, device_id: &DeviceId) -> DbResult<Vec<Alert>> {
        Ok(self.collect_newest_first(|a| a.device_id == *device_id))
    }

    async fn list_by_location_record(
        &self,
        record_id: &LocationRecordId,
    ) -> DbResult<Vec<Alert>> {
        Ok(self.collect_newest_first(|a| a.location_record_id == Some(*record_id)))
    }

    async fn list_all(&self) -> DbResult<Vec<Alert>> {
        Ok(self.collect_newest_first(|_| true))
    }
}

// ============================================================================
// DEVICE DIRECTORY
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    devices: DashMap<DeviceId, Device>,
    users: RwLock<HashMap<UserId, User>>,
    zones: RwLock<HashMap<ZoneId, GeoZone>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_device(&self, device: Device) {
        self.devices.insert(device.id, device);
    }

    pub fn insert_user(&self, user: User) {
        self.users.write().insert(user.id, user);
    }

    pub fn insert_zone(&self, zone: GeoZone) {
        self.zones.write().insert(zone.id, zone);
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn find_device(&self, device_id: &DeviceId) -> DbResult<Option<Device>> {
        Ok(self.devices.get(device_id).map(|d| d.value().clone()))
    }

    async fn find_device_by_imei(&self, imei: &str) -> DbResult<Option<Device>> {
        Ok(self
            .devices
            .iter()
            .find(|entry| entry.value().imei == imei)
            .map(|entry| entry.value().clone()))
    }

    async fn find_user(&self, user_id: &UserId) -> DbResult<Option<User>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn find_zone(&self, zone_id: &ZoneId) -> DbResult<Option<GeoZone>> {
        Ok(self.zones.read().get(zone_id).cloned())
    }

    async fn devices_owned_by(&self, owner_id: &UserId) -> DbResult<Vec<Device>> {
        Ok(self
            .devices
            .iter()
            .filter(|entry| entry.value().owner_id == Some(*owner_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn record_last_reported(
        &self,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        match self.devices.get_mut(device_id) {
            Some(mut device) => {
                device.last_reported_at = Some(at);
                Ok(())
            }
            None => Err(DbError::not_found(format!("device {device_id}"))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
