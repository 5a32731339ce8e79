//! Alert creation, resolution and queries

use crate::{GeofenceViolation, TrackingResult};

use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use tracking_core::{
    Alert, AlertId, AlertKind, AlertStatistics, CoreError, DeviceId, GeoPosition,
    LocationRecordId, NewAlert, UserId,
};
use tracking_db::{AlertStore, DeviceDirectory};
use tracking_telemetry::MetricsCollector;

/// Persists alerts and answers device- and owner-scoped alert queries
#[derive(Clone)]
pub struct AlertEmitter {
    store: Arc<dyn AlertStore>,
    directory: Arc<dyn DeviceDirectory>,
    metrics: Arc<MetricsCollector>,
}

impl AlertEmitter {
    pub fn new(
        store: Arc<dyn AlertStore>,
        directory: Arc<dyn DeviceDirectory>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            directory,
            metrics,
        }
    }

    // ========================================================================
    // CREATION
    // ========================================================================

    /// Validate and persist a new unresolved alert. Every call writes a new alert.
    #[instrument(skip_all, fields(device_id = %new.device_id, kind = %new.kind))]
    pub async fn create(&self, new: NewAlert) -> TrackingResult<Alert> {
        new.validate()?;

        if self.directory.find_device(&new.device_id).await?.is_none() {
            return Err(CoreError::device_not_found(new.device_id).into());
        }

        let alert = self.store.insert(Alert::from_new(new, Utc::now())).await?;
        self.metrics.record_alert_created(alert.kind);
        info!(alert_id = %alert.id, "alert created");

        Ok(alert)
    }

    /// Alert for a geofence violation raised by the report that produced `record_id`
    pub async fn create_geofence_alert(
        &self,
        violation: &GeofenceViolation,
        record_id: LocationRecordId,
    ) -> TrackingResult<Alert> {
        self.create(
            NewAlert::new(
                violation.device_id,
                AlertKind::GeofenceViolation,
                violation.message.clone(),
            )
            .at_position(violation.position)
            .caused_by(record_id),
        )
        .await
    }

    pub async fn create_movement_alert(
        &self,
        device_id: DeviceId,
        position: GeoPosition,
    ) -> TrackingResult<Alert> {
        self.create(
            NewAlert::new(
                device_id,
                AlertKind::MovementDetected,
                "Movement detected while device should be stationary",
            )
            .at_position(position),
        )
        .await
    }

    /// `battery_level` is a percentage
    pub async fn create_low_battery_alert(
        &self,
        device_id: DeviceId,
        battery_level: f64,
    ) -> TrackingResult<Alert> {
        self.create(NewAlert::new(
            device_id,
            AlertKind::LowBattery,
            format!("Low battery: {:.0}%", battery_level),
        ))
        .await
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Mark an alert resolved. Resolving twice refreshes `resolved_at`.
    #[instrument(skip_all, fields(alert_id = %alert_id))]
    pub async fn resolve(&self, alert_id: AlertId) -> TrackingResult<Alert> {
        let mut alert = self
            .store
            .get(&alert_id)
            .await?
            .ok_or_else(|| CoreError::alert_not_found(alert_id))?;

        alert.resolve(Utc::now());
        let alert = self.store.update(alert).await?;
        self.metrics.record_alert_resolved();
        info!("alert resolved");

        Ok(alert)
    }

    pub async fn delete(&self, alert_id: AlertId) -> TrackingResult<()> {
        if !self.store.delete(&alert_id).await? {
            return Err(CoreError::alert_not_found(alert_id).into());
        }
        info!(alert_id = %alert_id, "alert deleted");
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn get(&self, alert_id: AlertId) -> TrackingResult<Alert> {
        Ok(self
            .store
            .get(&alert_id)
            .await?
            .ok_or_else(|| CoreError::alert_not_found(alert_id))?)
    }

    /// Newest first
    pub async fn list_unresolved_by_device(
        &self,
        device_id: DeviceId,
    ) -> TrackingResult<Vec<Alert>> {
        if self.directory.find_device(&device_id).await?.is_none() {
            return Err(CoreError::device_not_found(device_id).into());
        }

        let alerts = self.store.list_by_device(&device_id).await?;
        Ok(alerts.into_iter().filter(|a| !a.resolved).collect())
    }

    /// Unresolved alerts across every device owned by the user, newest first
    pub async fn list_unresolved_by_owner(&self, owner_id: UserId) -> TrackingResult<Vec<Alert>> {
        let alerts = self.owner_alerts(owner_id).await?;
        Ok(alerts.into_iter().filter(|a| !a.resolved).collect())
    }

    pub async fn count_unresolved_by_owner(&self, owner_id: UserId) -> TrackingResult<u64> {
        let alerts = self.list_unresolved_by_owner(owner_id).await?;
        Ok(alerts.len() as u64)
    }

    /// Counts over every alert of the owner's devices, resolved or not
    pub async fn statistics(&self, owner_id: UserId) -> TrackingResult<AlertStatistics> {
        let alerts = self.owner_alerts(owner_id).await?;
        Ok(AlertStatistics::from_alerts(&alerts))
    }

    pub async fn list_all(&self) -> TrackingResult<Vec<Alert>> {
        Ok(self.store.list_all().await?)
    }

    /// Case-insensitive substring match on the message. A blank term matches all.
    pub async fn search(&self, term: &str) -> TrackingResult<Vec<Alert>> {
        let alerts = self.store.list_all().await?;
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(alerts);
        }

        Ok(alerts
            .into_iter()
            .filter(|a| a.message.to_lowercase().contains(&term))
            .collect())
    }

    /// Alerts raised by the report that produced this location record
    pub async fn alerts_for_record(
        &self,
        record_id: LocationRecordId,
    ) -> TrackingResult<Vec<Alert>> {
        Ok(self.store.list_by_location_record(&record_id).await?)
    }

    pub async fn has_unresolved(
        &self,
        device_id: DeviceId,
        kind: AlertKind,
    ) -> TrackingResult<bool> {
        let alerts = self.store.list_by_device(&device_id).await?;
        Ok(alerts.iter().any(|a| a.kind == kind && !a.resolved))
    }

    async fn owner_alerts(&self, owner_id: UserId) -> TrackingResult<Vec<Alert>> {
        if self.directory.find_user(&owner_id).await?.is_none() {
            return Err(CoreError::user_not_found(owner_id).into());
        }

        let devices = self.directory.devices_owned_by(&owner_id).await?;
        debug!(owner_id = %owner_id, devices = devices.len(), "collecting owner alerts");

        let per_device =
            try_join_all(devices.iter().map(|d| self.store.list_by_device(&d.id))).await?;

        let mut alerts: Vec<Alert> = per_device.into_iter().flatten().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}

// ============================================================================
// TESTS
// ============================================================================
