//! ScyllaDB adapters for the persistence ports

use crate::store::{AlertStore, DeviceDirectory, LocationLedger};
use crate::{DbError, DbResult};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use scylla::Session;
use scylla::deserialize::DeserializeRow;
use scylla::serialize::row::SerializeRow;
use std::sync::Arc;
use tracing::debug;
use tracking_core::{
    Alert, AlertId, AlertKind, Device, DeviceId, GeoZone, LocationRecord, LocationRecordId,
    NewLocationRecord, User, UserId, ZoneId,
};
use uuid::Uuid;

/// Run a SELECT and deserialize every row
async fn select_rows<R>(
    session: &Session,
    query: &str,
    values: impl SerializeRow,
) -> DbResult<Vec<R>>
where
    R: for<'frame, 'metadata> DeserializeRow<'frame, 'metadata>,
{
    let result = session
        .query_unpaged(query, values)
        .await
        .map_err(|e| DbError::Query(e.to_string()))?;

    let rows_result = result
        .into_rows_result()
        .map_err(|e| DbError::Query(e.to_string()))?;

    let rows = rows_result
        .rows::<R>()
        .map_err(|e| DbError::Serialization(e.to_string()))?
        .collect::<Result<Vec<R>, _>>()
        .map_err(|e| DbError::Serialization(e.to_string()))?;

    Ok(rows)
}

/// Run a statement that returns no rows
async fn execute(session: &Session, query: &str, values: impl SerializeRow) -> DbResult<()> {
    session
        .query_unpaged(query, values)
        .await
        .map_err(|e| DbError::Query(e.to_string()))?;
    Ok(())
}

// ============================================================================
// LOCATION LEDGER
// ============================================================================

const LOCATION_COLUMNS: &str =
    "device_id, recorded_at, record_id, latitude, longitude, recorded_address, recorded_by";

type LocationRow = (
    Uuid,
    DateTime<Utc>,
    Uuid,
    f64,
    f64,
    Option<String>,
    Option<Uuid>,
);

fn location_from_row(row: LocationRow) -> LocationRecord {
    let (device_id, recorded_at, record_id, latitude, longitude, recorded_address, recorded_by) =
        row;
    LocationRecord {
        id: LocationRecordId::from_uuid(record_id),
        device_id: DeviceId::from_uuid(device_id),
        latitude,
        longitude,
        timestamp: recorded_at,
        recorded_address,
        recorded_by: recorded_by.map(UserId::from_uuid),
        alerts: Vec::new(),
    }
}

/// Location history partitioned by device, clustered newest first
#[derive(Clone)]
pub struct ScyllaLedger {
    session: Arc<Session>,
}

impl ScyllaLedger {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn select(
        &self,
        query: &str,
        values: impl SerializeRow,
    ) -> DbResult<Vec<LocationRecord>> {
        let rows: Vec<LocationRow> = select_rows(&self.session, query, values).await?;
        Ok(rows.into_iter().map(location_from_row).collect())
    }
}

#[async_trait]
impl LocationLedger for ScyllaLedger {
    async fn append(&self, record: NewLocationRecord) -> DbResult<LocationRecord> {
        let mut record = record.into_record(Utc::now());
        // CQL timestamps hold milliseconds
        record.timestamp = record.timestamp.trunc_subsecs(3);
        let query = format!(
            "INSERT INTO location_history ({LOCATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        );

        execute(
            &self.session,
            &query,
            (
                record.device_id.as_uuid(),
                record.timestamp,
                record.id.as_uuid(),
                record.latitude,
                record.longitude,
                record.recorded_address.as_deref(),
                record.recorded_by.map(|u| u.as_uuid()),
            ),
        )
        .await?;

        debug!(device_id = %record.device_id, record_id = %record.id, "location appended");
        Ok(record)
    }

    async fn latest(&self, device_id: &DeviceId) -> DbResult<Option<LocationRecord>> {
        let query =
            format!("SELECT {LOCATION_COLUMNS} FROM location_history WHERE device_id = ? LIMIT 1");
        let mut records = self.select(&query, (device_id.as_uuid(),)).await?;
        Ok(records.pop())
    }

    async fn range(
        &self,
        device_id: &DeviceId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<LocationRecord>> {
        let base = format!("SELECT {LOCATION_COLUMNS} FROM location_history WHERE device_id = ?");
        let order = "ORDER BY recorded_at ASC";
        let id = device_id.as_uuid();

        match (from, to) {
            (Some(from), Some(to)) => {
                let query = format!("{base} AND recorded_at >= ? AND recorded_at <= ? {order}");
                self.select(&query, (id, from, to)).await
            }
            (Some(from), None) => {
                let query = format!("{base} AND recorded_at >= ? {order}");
                self.select(&query, (id, from)).await
            }
            (None, Some(to)) => {
                let query = format!("{base} AND recorded_at <= ? {order}");
                self.select(&query, (id, to)).await
            }
            (None, None) => {
                let query = format!("{base} {order}");
                self.select(&query, (id,)).await
            }
        }
    }

    async fn since(
        &self,
        device_id: &DeviceId,
        instant: DateTime<Utc>,
    ) -> DbResult<Vec<LocationRecord>> {
        let query = format!(
            "SELECT {LOCATION_COLUMNS} FROM location_history \
             WHERE device_id = ? AND recorded_at > ?"
        );
        self.select(&query, (device_id.as_uuid(), instant)).await
    }

    async fn all_descending(&self, device_id: &DeviceId) -> DbResult<Vec<LocationRecord>> {
        let query =
            format!("SELECT {LOCATION_COLUMNS} FROM location_history WHERE device_id = ?");
        self.select(&query, (device_id.as_uuid(),)).await
    }
}

// ============================================================================
// ALERT STORE
// ============================================================================

const ALERT_COLUMNS: &str = "alert_id, device_id, message, alert_kind, latitude, longitude, \
     location_record_id, created_at, resolved, resolved_at";

type AlertRow = (
    Uuid,
    Uuid,
    String,
    String,
    Option<f64>,
    Option<f64>,
    Option<Uuid>,
    DateTime<Utc>,
    Option<bool>,
    Option<DateTime<Utc>>,
);

fn alert_from_row(row: AlertRow) -> DbResult<Alert> {
    let (
        alert_id,
        device_id,
        message,
        kind,
        latitude,
        longitude,
        location_record_id,
        created_at,
        resolved,
        resolved_at,
    ) = row;

    let kind = kind
        .parse::<AlertKind>()
        .map_err(|e| DbError::serialization(e.to_string()))?;

    Ok(Alert {
        id: AlertId::from_uuid(alert_id),
        device_id: DeviceId::from_uuid(device_id),
        message,
        kind,
        latitude,
        longitude,
        location_record_id: location_record_id.map(LocationRecordId::from_uuid),
        created_at,
        resolved: resolved.unwrap_or(false),
        resolved_at,
    })
}

/// Alerts keyed by id, denormalized per device and per triggering location record
#[derive(Clone)]
pub struct ScyllaAlertStore {
    session: Arc<Session>,
}

impl ScyllaAlertStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn select(&self, query: &str, values: impl SerializeRow) -> DbResult<Vec<Alert>> {
        let rows: Vec<AlertRow> = select_rows(&self.session, query, values).await?;
        rows.into_iter().map(alert_from_row).collect()
    }

    /// Upsert the alert into every table that carries it
    async fn write(&self, alert: &Alert) -> DbResult<()> {
        let values = (
            alert.id.as_uuid(),
            alert.device_id.as_uuid(),
            alert.message.as_str(),
            alert.kind.as_str(),
            alert.latitude,
            alert.longitude,
            alert.location_record_id.map(|r| r.as_uuid()),
            alert.created_at,
            alert.resolved,
            alert.resolved_at,
        );
        let placeholders = "?, ?, ?, ?, ?, ?, ?, ?, ?, ?";

        execute(
            &self.session,
            &format!("INSERT INTO alerts ({ALERT_COLUMNS}) VALUES ({placeholders})"),
            values,
        )
        .await?;

        execute(
            &self.session,
            &format!("INSERT INTO alerts_by_device ({ALERT_COLUMNS}) VALUES ({placeholders})"),
            values,
        )
        .await?;

        if alert.location_record_id.is_some() {
            execute(
                &self.session,
                &format!(
                    "INSERT INTO alerts_by_location_record ({ALERT_COLUMNS}) \
                     VALUES ({placeholders})"
                ),
                values,
            )
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl AlertStore for ScyllaAlertStore {
    async fn insert(&self, alert: Alert) -> DbResult<Alert> {
        self.write(&alert).await?;
        debug!(alert_id = %alert.id, device_id = %alert.device_id, "alert stored");
        Ok(alert)
    }

    async fn get(&self, alert_id: &AlertId) -> DbResult<Option<Alert>> {
        let query = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE alert_id = ?");
        let mut alerts = self.select(&query, (alert_id.as_uuid(),)).await?;
        Ok(alerts.pop())
    }

    async fn update(&self, alert: Alert) -> DbResult<Alert> {
        if self.get(&alert.id).await?.is_none() {
            return Err(DbError::not_found(format!("alert {}", alert.id)));
        }
        self.write(&alert).await?;
        Ok(alert)
    }

    async fn delete(&self, alert_id: &AlertId) -> DbResult<bool> {
        let Some(alert) = self.get(alert_id).await? else {
            return Ok(false);
        };

        execute(
            &self.session,
            "DELETE FROM alerts WHERE alert_id = ?",
            (alert.id.as_uuid(),),
        )
        .await?;

        execute(
            &self.session,
            "DELETE FROM alerts_by_device WHERE device_id = ? AND created_at = ? AND alert_id = ?",
            (alert.device_id.as_uuid(), alert.created_at, alert.id.as_uuid()),
        )
        .await?;

        if let Some(record_id) = alert.location_record_id {
            execute(
                &self.session,
                "DELETE FROM alerts_by_location_record \
                 WHERE location_record_id = ? AND alert_id = ?",
                (record_id.as_uuid(), alert.id.as_uuid()),
            )
            .await?;
        }

        Ok(true)
    }

    async fn list_by_device(&self, device_id: &DeviceId) -> DbResult<Vec<Alert>> {
        let query = format!("SELECT {ALERT_COLUMNS} FROM alerts_by_device WHERE device_id = ?");
        self.select(&query, (device_id.as_uuid(),)).await
    }

    async fn list_by_location_record(
        &self,
        record_id: &LocationRecordId,
    ) -> DbResult<Vec<Alert>> {
        let query = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts_by_location_record WHERE location_record_id = ?"
        );
        let mut alerts = self.select(&query, (record_id.as_uuid(),)).await?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn list_all(&self) -> DbResult<Vec<Alert>> {
        let query = format!("SELECT {ALERT_COLUMNS} FROM alerts");
        let mut alerts = self.select(&query, ()).await?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}

// ============================================================================
// DEVICE DIRECTORY
// ============================================================================

const DEVICE_COLUMNS: &str = "device_id, imei, serial_number, owner_id, zone_id, last_reported_at";

type DeviceRow = (
    Uuid,
    String,
    Option<String>,
    Option<Uuid>,
    Option<Uuid>,
    Option<DateTime<Utc>>,
);

fn device_from_row(row: DeviceRow) -> Device {
    let (device_id, imei, serial_number, owner_id, zone_id, last_reported_at) = row;
    Device {
        id: DeviceId::from_uuid(device_id),
        imei,
        serial_number,
        owner_id: owner_id.map(UserId::from_uuid),
        zone_id: zone_id.map(ZoneId::from_uuid),
        last_reported_at,
    }
}

/// Read access to the registry tables maintained by the device management service
#[derive(Clone)]
pub struct ScyllaDirectory {
    session: Arc<Session>,
}

impl ScyllaDirectory {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl DeviceDirectory for ScyllaDirectory {
    async fn find_device(&self, device_id: &DeviceId) -> DbResult<Option<Device>> {
        let query = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?");
        let mut rows: Vec<DeviceRow> =
            select_rows(&self.session, &query, (device_id.as_uuid(),)).await?;
        Ok(rows.pop().map(device_from_row))
    }

    async fn find_device_by_imei(&self, imei: &str) -> DbResult<Option<Device>> {
        let mut ids: Vec<(Uuid,)> = select_rows(
            &self.session,
            "SELECT device_id FROM devices_by_imei WHERE imei = ?",
            (imei,),
        )
        .await?;

        match ids.pop() {
            Some((device_id,)) => self.find_device(&DeviceId::from_uuid(device_id)).await,
            None => Ok(None),
        }
    }

    async fn find_user(&self, user_id: &UserId) -> DbResult<Option<User>> {
        let mut rows: Vec<(Uuid, String)> = select_rows(
            &self.session,
            "SELECT user_id, display_name FROM users WHERE user_id = ?",
            (user_id.as_uuid(),),
        )
        .await?;

        Ok(rows.pop().map(|(id, display_name)| User {
            id: UserId::from_uuid(id),
            display_name,
        }))
    }

    async fn find_zone(&self, zone_id: &ZoneId) -> DbResult<Option<GeoZone>> {
        let mut rows: Vec<(Uuid, String, Option<f64>, Option<f64>)> = select_rows(
            &self.session,
            "SELECT zone_id, name, center_latitude, center_longitude \
             FROM geo_zones WHERE zone_id = ?",
            (zone_id.as_uuid(),),
        )
        .await?;

        Ok(rows
            .pop()
            .map(|(id, name, center_latitude, center_longitude)| GeoZone {
                id: ZoneId::from_uuid(id),
                name,
                center_latitude,
                center_longitude,
            }))
    }

    async fn devices_owned_by(&self, owner_id: &UserId) -> DbResult<Vec<Device>> {
        let ids: Vec<(Uuid,)> = select_rows(
            &self.session,
            "SELECT device_id FROM devices_by_owner WHERE owner_id = ?",
            (owner_id.as_uuid(),),
        )
        .await?;

        let lookups = ids
            .into_iter()
            .map(|(id,)| async move { self.find_device(&DeviceId::from_uuid(id)).await });
        let devices = futures::future::try_join_all(lookups).await?;

        Ok(devices.into_iter().flatten().collect())
    }

    async fn record_last_reported(
        &self,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        execute(
            &self.session,
            "UPDATE devices SET last_reported_at = ? WHERE device_id = ?",
            (at, device_id.as_uuid()),
        )
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn alert_row(kind: &str) -> AlertRow {
        (
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Low battery: 9%".to_string(),
            kind.to_string(),
            None,
            None,
            None,
            Utc::now().trunc_subsecs(3),
            None,
            None,
        )
    }

    #[test]
    fn test_location_row_mapping() {
        let device_id = Uuid::new_v4();
        let record_id = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let at = Utc::now().trunc_subsecs(3);

        let record = location_from_row((
            device_id,
            at,
            record_id,
            -1.95,
            30.09,
            Some("KN 3 Ave".to_string()),
            Some(actor),
        ));

        assert_eq!(record.id, LocationRecordId::from_uuid(record_id));
        assert_eq!(record.device_id, DeviceId::from_uuid(device_id));
        assert_eq!(record.timestamp, at);
        assert_eq!((record.latitude, record.longitude), (-1.95, 30.09));
        assert_eq!(record.recorded_address.as_deref(), Some("KN 3 Ave"));
        assert_eq!(record.recorded_by, Some(UserId::from_uuid(actor)));
        assert!(record.alerts.is_empty());
    }

    #[test]
    fn test_alert_row_mapping() {
        let mut row = alert_row("GEOFENCE_VIOLATION");
        let record_id = Uuid::new_v4();
        row.4 = Some(1.0);
        row.5 = Some(0.0);
        row.6 = Some(record_id);

        let alert = alert_from_row(row.clone()).unwrap();
        assert_eq!(alert.id, AlertId::from_uuid(row.0));
        assert_eq!(alert.kind, AlertKind::GeofenceViolation);
        assert_eq!(alert.latitude, Some(1.0));
        assert_eq!(
            alert.location_record_id,
            Some(LocationRecordId::from_uuid(record_id))
        );
        assert_eq!(alert.created_at, row.7);
    }

    #[test]
    fn test_alert_row_without_resolved_flag_is_open() {
        let alert = alert_from_row(alert_row("LOW_BATTERY")).unwrap();
        assert!(!alert.resolved);
        assert!(alert.resolved_at.is_none());
        assert!(alert.location_record_id.is_none());

        let mut row = alert_row("MOVEMENT_DETECTED");
        row.8 = Some(true);
        row.9 = Some(row.7);
        let alert = alert_from_row(row).unwrap();
        assert!(alert.resolved);
        assert_eq!(alert.resolved_at, Some(alert.created_at));
    }

    #[test]
    fn test_unknown_alert_kind_is_a_serialization_error() {
        let result = alert_from_row(alert_row("SPEEDING"));
        assert!(matches!(result, Err(DbError::Serialization(_))));
    }

    #[test]
    fn test_device_row_mapping() {
        let device_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let zone = Uuid::new_v4();

        let device = device_from_row((
            device_id,
            "356938035643809".to_string(),
            Some("SN-1".to_string()),
            Some(owner),
            Some(zone),
            None,
        ));

        assert_eq!(device.id, DeviceId::from_uuid(device_id));
        assert_eq!(device.imei, "356938035643809");
        assert_eq!(device.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(device.owner_id, Some(UserId::from_uuid(owner)));
        assert_eq!(device.zone_id, Some(ZoneId::from_uuid(zone)));
        assert!(device.last_reported_at.is_none());

        let bare = device_from_row((device_id, "IMEI-2".to_string(), None, None, None, None));
        assert!(bare.owner_id.is_none() && bare.zone_id.is_none());
    }
}
