//! Location report orchestration and history reads

use crate::{
    AlertEmitter, GeofenceEvaluator, Geocoder, TrackerConfig, TrackingError, TrackingResult,
    placeholder_address,
};

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use tracking_core::{
    AlertKind, CoreError, Device, DeviceId, DeviceStatus, GeoPosition, GeoZone, LocationRecord,
    NewLocationRecord, UserId,
};
use tracking_db::{AlertStore, DeviceDirectory, LocationLedger};
use tracking_telemetry::MetricsCollector;

/// An inbound location report
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReport {
    pub device_id: DeviceId,
    pub latitude: f64,
    pub longitude: f64,
    /// Client-supplied address; blank triggers reverse geocoding
    pub address: Option<String>,
    /// Optional audit actor
    pub recorded_by: Option<UserId>,
}

impl LocationReport {
    pub fn new(device_id: DeviceId, latitude: f64, longitude: f64) -> Self {
        Self {
            device_id,
            latitude,
            longitude,
            address: None,
            recorded_by: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn recorded_by(mut self, user_id: UserId) -> Self {
        self.recorded_by = Some(user_id);
        self
    }

    fn position(&self) -> GeoPosition {
        GeoPosition::new(self.latitude, self.longitude)
    }
}

/// Composes the directory, ledger, geofence evaluator and alert emitter
pub struct TrackingEngine {
    config: TrackerConfig,
    ledger: Arc<dyn LocationLedger>,
    directory: Arc<dyn DeviceDirectory>,
    alerts: AlertEmitter,
    geofence: GeofenceEvaluator,
    geocoder: Option<Arc<dyn Geocoder>>,
    metrics: Arc<MetricsCollector>,
}

impl TrackingEngine {
    pub fn new(
        config: TrackerConfig,
        ledger: Arc<dyn LocationLedger>,
        directory: Arc<dyn DeviceDirectory>,
        alert_store: Arc<dyn AlertStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            geofence: GeofenceEvaluator::new(config.geofence_radius_km),
            alerts: AlertEmitter::new(alert_store, directory.clone(), metrics.clone()),
            config,
            ledger,
            directory,
            geocoder: None,
            metrics,
        }
    }

    /// Enable reverse geocoding of reports that arrive without an address
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn alerts(&self) -> &AlertEmitter {
        &self.alerts
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Persist a report, run the geofence check and return the stored record
    /// with the alerts this report raised attached.
    #[instrument(skip_all, fields(device_id = %report.device_id))]
    pub async fn report_location(&self, report: LocationReport) -> TrackingResult<LocationRecord> {
        let started = Instant::now();
        let result = self.ingest(report).await;

        match &result {
            Ok(record) => {
                self.metrics
                    .record_location_report(started.elapsed().as_secs_f64());
                debug!(record_id = %record.id, alerts = record.alerts.len(), "report processed");
            }
            Err(e) => self.record_failure(e),
        }

        result
    }

    #[instrument(skip(self, latitude, longitude))]
    pub async fn report_location_by_imei(
        &self,
        imei: &str,
        latitude: f64,
        longitude: f64,
    ) -> TrackingResult<LocationRecord> {
        let device = match self.directory.find_device_by_imei(imei).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                let e = TrackingError::from(CoreError::device_not_found_by_imei(imei));
                self.record_failure(&e);
                return Err(e);
            }
            Err(e) => {
                let e = TrackingError::from(e);
                self.record_failure(&e);
                return Err(e);
            }
        };

        self.report_location(LocationReport::new(device.id, latitude, longitude))
            .await
    }

    async fn ingest(&self, report: LocationReport) -> TrackingResult<LocationRecord> {
        let device = self
            .directory
            .find_device(&report.device_id)
            .await?
            .ok_or_else(|| CoreError::device_not_found(report.device_id))?;

        if let Some(actor) = report.recorded_by {
            if self.directory.find_user(&actor).await?.is_none() {
                return Err(CoreError::user_not_found(actor).into());
            }
        }

        let position = report.position();
        if !position.is_valid() {
            return Err(CoreError::invalid_position(report.latitude, report.longitude).into());
        }

        let address = match report.address.filter(|a| !a.trim().is_empty()) {
            Some(address) => Some(address),
            None => self.resolve_address(position).await,
        };

        let record = self
            .ledger
            .append(
                NewLocationRecord::new(device.id, position)
                    .with_address(address)
                    .recorded_by(report.recorded_by),
            )
            .await?;
        info!(record_id = %record.id, "location recorded");

        if let Err(e) = self
            .directory
            .record_last_reported(&device.id, record.timestamp)
            .await
        {
            warn!(error = %e, "failed to update last reported time");
        }

        let zone = self.assigned_zone(&device).await?;
        if let Some(violation) = self.geofence.evaluate(&device, zone.as_ref(), position) {
            self.metrics.record_geofence_violation();
            warn!(
                zone_id = %violation.zone_id,
                distance_km = violation.distance_km,
                "geofence violation"
            );

            if self.config.suppress_repeat_violations
                && self
                    .alerts
                    .has_unresolved(device.id, AlertKind::GeofenceViolation)
                    .await?
            {
                debug!("unresolved geofence alert already open, not raising another");
            } else {
                self.alerts.create_geofence_alert(&violation, record.id).await?;
            }
        }

        let alerts = self.alerts.alerts_for_record(record.id).await?;
        Ok(record.with_alerts(alerts))
    }

    /// Geocoder result, or the placeholder when the lookup fails or finds nothing
    async fn resolve_address(&self, position: GeoPosition) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;

        match geocoder.reverse(position).await {
            Ok(Some(address)) => Some(address),
            Ok(None) => Some(placeholder_address(position)),
            Err(e) => {
                self.metrics.record_geocoder_failure();
                warn!(error = %e, "reverse geocoding failed, using placeholder address");
                Some(placeholder_address(position))
            }
        }
    }

    async fn assigned_zone(&self, device: &Device) -> TrackingResult<Option<GeoZone>> {
        let Some(zone_id) = device.zone_id else {
            return Ok(None);
        };

        let zone = self.directory.find_zone(&zone_id).await?;
        if zone.is_none() {
            warn!(zone_id = %zone_id, "assigned zone not found in directory");
        }
        Ok(zone)
    }

    fn record_failure(&self, e: &TrackingError) {
        self.metrics.record_report_failure(e.reason());
        match e {
            TrackingError::Persistence(_) => error!(error = %e, "location report failed"),
            TrackingError::Core(_) => debug!(error = %e, "location report rejected"),
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub async fn get_last_location(&self, device_id: DeviceId) -> TrackingResult<LocationRecord> {
        Ok(self
            .ledger
            .latest(&device_id)
            .await?
            .ok_or_else(|| CoreError::no_location_recorded(device_id))?)
    }

    /// Inclusive bounds, ascending. Empty rather than an error when nothing matches.
    pub async fn get_history(
        &self,
        device_id: DeviceId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> TrackingResult<Vec<LocationRecord>> {
        Ok(self.ledger.range(&device_id, from, to).await?)
    }

    /// Records from the last `hours` (configured default when `None`), newest first
    pub async fn get_recent_history(
        &self,
        device_id: DeviceId,
        hours: Option<u32>,
    ) -> TrackingResult<Vec<LocationRecord>> {
        let hours = hours.unwrap_or(self.config.default_recent_hours);
        let since = TimeDelta::try_hours(i64::from(hours))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| CoreError::invalid_input(format!("hours out of range: {hours}")))?;
        Ok(self.ledger.since(&device_id, since).await?)
    }

    pub async fn get_all_locations(
        &self,
        device_id: DeviceId,
    ) -> TrackingResult<Vec<LocationRecord>> {
        Ok(self.ledger.all_descending(&device_id).await?)
    }

    pub async fn get_device_status(&self, device_id: DeviceId) -> TrackingResult<DeviceStatus> {
        if self.directory.find_device(&device_id).await?.is_none() {
            return Err(CoreError::device_not_found(device_id).into());
        }

        let status = match self.ledger.latest(&device_id).await? {
            Some(record) => {
                // A window reaching past the representable range keeps every device online
                let cutoff = i64::try_from(self.config.online_window_secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|window| Utc::now().checked_sub_signed(window));
                let online = cutoff.is_none_or(|cutoff| record.timestamp > cutoff);
                DeviceStatus::from_latest(&record, online)
            }
            None => DeviceStatus::never_reported(device_id),
        };

        Ok(status)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeocodeError;
    use crate::geocoder::MockGeocoder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracking_core::{User, ZoneId};
    use tracking_db::{
        DbError, MemoryAlertStore, MemoryDirectory, MemoryLedger, MockAlertStore,
        MockDeviceDirectory, MockLocationLedger,
    };

    struct Fixture {
        engine: TrackingEngine,
        ledger: Arc<MemoryLedger>,
        directory: Arc<MemoryDirectory>,
        alerts: Arc<MemoryAlertStore>,
    }

    fn fixture_with(config: TrackerConfig) -> Fixture {
        let ledger = Arc::new(MemoryLedger::new());
        let directory = Arc::new(MemoryDirectory::new());
        let alerts = Arc::new(MemoryAlertStore::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let engine = TrackingEngine::new(
            config,
            ledger.clone(),
            directory.clone(),
            alerts.clone(),
            metrics,
        );
        Fixture {
            engine,
            ledger,
            directory,
            alerts,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(TrackerConfig::default())
    }

    /// Registers a device assigned to a zone centred at `center`
    fn zoned_device(f: &Fixture, imei: &str, center: (f64, f64)) -> Device {
        let zone = GeoZone::new("Assigned Area").with_center(center.0, center.1);
        let device = Device::new(imei).assigned_to(zone.id);
        f.directory.insert_zone(zone);
        f.directory.insert_device(device.clone());
        device
    }

    fn metrics() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::new().unwrap())
    }

    #[tokio::test]
    async fn test_report_inside_zone_raises_nothing() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-0", (0.0, 0.0));

        let record = f
            .engine
            .report_location(LocationReport::new(device.id, 0.0, 0.0).with_address("Null Island"))
            .await
            .unwrap();

        assert!(record.alerts.is_empty());
        assert!(f.alerts.is_empty());
        assert_eq!(f.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_report_outside_zone_raises_one_alert() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-0", (0.0, 0.0));

        let record = f
            .engine
            .report_location(
                LocationReport::new(device.id, 1.0, 0.0).with_address("Gulf of Guinea"),
            )
            .await
            .unwrap();

        assert_eq!(record.alerts.len(), 1);
        let alert = &record.alerts[0];
        assert_eq!(alert.kind, AlertKind::GeofenceViolation);
        assert_eq!(alert.location_record_id, Some(record.id));
        assert_eq!(alert.latitude, Some(1.0));

        let distance: f64 = alert
            .message
            .split("Distance from center: ")
            .nth(1)
            .and_then(|s| s.trim_end_matches(" km.").parse().ok())
            .unwrap();
        assert!(distance >= 100.0);
        assert_eq!(f.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_device_without_boundary_never_alerts() {
        let f = fixture();
        let device = Device::new("IMEI-FREE");
        f.directory.insert_device(device.clone());

        for (lat, lon) in [(0.0, 0.0), (45.0, 90.0), (-80.0, -170.0)] {
            let record = f
                .engine
                .report_location(LocationReport::new(device.id, lat, lon).with_address("somewhere"))
                .await
                .unwrap();
            assert!(record.alerts.is_empty());
        }
        assert!(f.alerts.is_empty());
        assert_eq!(f.ledger.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_zone_record_is_treated_as_no_boundary() {
        let f = fixture();
        let device = Device::new("IMEI-ORPHAN").assigned_to(tracking_core::ZoneId::new());
        f.directory.insert_device(device.clone());

        let record = f
            .engine
            .report_location(LocationReport::new(device.id, 10.0, 10.0).with_address("x"))
            .await
            .unwrap();
        assert!(record.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_device_writes_nothing() {
        let f = fixture();

        let err = f
            .engine
            .report_location(LocationReport::new(DeviceId::new(), 1.0, 1.0))
            .await
            .unwrap_err();

        assert!(matches!(err, TrackingError::Core(CoreError::DeviceNotFound(_))));
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_actor_is_rejected() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));

        let err = f
            .engine
            .report_location(LocationReport::new(device.id, 0.0, 0.0).recorded_by(UserId::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, TrackingError::Core(CoreError::UserNotFound(_))));
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_known_actor_is_recorded() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));
        let actor = User::new("Field Agent");
        f.directory.insert_user(actor.clone());

        let record = f
            .engine
            .report_location(LocationReport::new(device.id, 0.0, 0.0).recorded_by(actor.id))
            .await
            .unwrap();
        assert_eq!(record.recorded_by, Some(actor.id));
    }

    #[tokio::test]
    async fn test_invalid_coordinates_are_rejected_before_persistence() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));

        for (lat, lon) in [(91.0, 0.0), (0.0, -180.5), (f64::NAN, 0.0)] {
            let err = f
                .engine
                .report_location(LocationReport::new(device.id, lat, lon))
                .await
                .unwrap_err();
            assert!(matches!(err, TrackingError::Core(CoreError::InvalidPosition { .. })));
        }
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_kigali_scenario() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (-1.95, 30.09));

        let first = f
            .engine
            .report_location_by_imei("IMEI-1", -1.951, 30.091)
            .await
            .unwrap();
        assert!(first.alerts.is_empty());
        assert_eq!(first.latitude, -1.951);
        assert_eq!(first.longitude, 30.091);

        let second = f
            .engine
            .report_location_by_imei("IMEI-1", -1.90, 30.20)
            .await
            .unwrap();
        assert_eq!(second.alerts.len(), 1);
        assert_eq!(second.alerts[0].kind, AlertKind::GeofenceViolation);
        assert!(second.alerts[0].message.contains("IMEI-1"));

        let last = f.engine.get_last_location(device.id).await.unwrap();
        assert_eq!(last.id, second.id);

        let unresolved = f
            .engine
            .alerts()
            .list_unresolved_by_device(device.id)
            .await
            .unwrap();
        assert_eq!(unresolved.len(), 1);

        let device_after = f.directory.find_device(&device.id).await.unwrap().unwrap();
        assert_eq!(device_after.last_reported_at, Some(second.timestamp));
    }

    #[tokio::test]
    async fn test_unknown_imei_is_not_found() {
        let f = fixture();
        let err = f
            .engine
            .report_location_by_imei("IMEI-404", 0.0, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Core(CoreError::DeviceNotFoundByImei(_))));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_repeated_violations_alert_every_time_by_default() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));

        for _ in 0..3 {
            let record = f
                .engine
                .report_location(LocationReport::new(device.id, 1.0, 0.0).with_address("out"))
                .await
                .unwrap();
            assert_eq!(record.alerts.len(), 1);
        }
        assert_eq!(f.alerts.len(), 3);
    }

    #[tokio::test]
    async fn test_repeat_violations_can_be_suppressed() {
        let f = fixture_with(TrackerConfig {
            suppress_repeat_violations: true,
            ..Default::default()
        });
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));
        let report = LocationReport::new(device.id, 1.0, 0.0).with_address("out");

        let first = f.engine.report_location(report.clone()).await.unwrap();
        let second = f.engine.report_location(report.clone()).await.unwrap();
        assert_eq!(first.alerts.len(), 1);
        assert!(second.alerts.is_empty());
        assert_eq!(f.alerts.len(), 1);

        f.engine.alerts().resolve(first.alerts[0].id).await.unwrap();
        let third = f.engine.report_location(report).await.unwrap();
        assert_eq!(third.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_alerts_attach_only_to_their_own_report() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));

        let outside = f
            .engine
            .report_location(LocationReport::new(device.id, 1.0, 0.0).with_address("out"))
            .await
            .unwrap();
        let inside = f
            .engine
            .report_location(LocationReport::new(device.id, 0.0, 0.0).with_address("in"))
            .await
            .unwrap();

        assert_eq!(outside.alerts.len(), 1);
        assert!(inside.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_geocoder_fills_blank_address() {
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_reverse()
            .times(1)
            .returning(|_| Ok(Some("KN 5 Rd, Kigali".to_string())));

        let f = fixture();
        let engine = TrackingEngine::new(
            TrackerConfig::default(),
            f.ledger.clone(),
            f.directory.clone(),
            f.alerts.clone(),
            metrics(),
        )
        .with_geocoder(Arc::new(geocoder));
        let device = zoned_device(&f, "IMEI-1", (-1.95, 30.09));

        let record = engine
            .report_location(LocationReport::new(device.id, -1.95, 30.09).with_address("   "))
            .await
            .unwrap();
        assert_eq!(record.recorded_address.as_deref(), Some("KN 5 Rd, Kigali"));
    }

    #[tokio::test]
    async fn test_geocoder_failure_degrades_to_placeholder() {
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_reverse()
            .returning(|_| Err(GeocodeError::Status(503)));

        let f = fixture();
        let engine = TrackingEngine::new(
            TrackerConfig::default(),
            f.ledger.clone(),
            f.directory.clone(),
            f.alerts.clone(),
            metrics(),
        )
        .with_geocoder(Arc::new(geocoder));
        let device = zoned_device(&f, "IMEI-1", (-1.95, 30.09));

        let record = engine
            .report_location(LocationReport::new(device.id, -1.95, 30.09))
            .await
            .unwrap();
        assert_eq!(
            record.recorded_address.as_deref(),
            Some("Unknown location (-1.950000, 30.090000)")
        );
        assert_eq!(f.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_supplied_address_skips_geocoder() {
        let mut geocoder = MockGeocoder::new();
        geocoder.expect_reverse().never();

        let f = fixture();
        let engine = TrackingEngine::new(
            TrackerConfig::default(),
            f.ledger.clone(),
            f.directory.clone(),
            f.alerts.clone(),
            metrics(),
        )
        .with_geocoder(Arc::new(geocoder));
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));

        let record = engine
            .report_location(LocationReport::new(device.id, 0.0, 0.0).with_address("Depot"))
            .await
            .unwrap();
        assert_eq!(record.recorded_address.as_deref(), Some("Depot"));
    }

    #[tokio::test]
    async fn test_ledger_failure_propagates_without_alerts() {
        let device = Device::new("IMEI-1").assigned_to(tracking_core::ZoneId::new());
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert_device(device.clone());

        let mut ledger = MockLocationLedger::new();
        ledger
            .expect_append()
            .returning(|_| Err(DbError::Query("write timeout".into())));
        let alerts = Arc::new(MemoryAlertStore::new());

        let engine = TrackingEngine::new(
            TrackerConfig::default(),
            Arc::new(ledger),
            directory,
            alerts.clone(),
            metrics(),
        );

        let err = engine
            .report_location(LocationReport::new(device.id, 1.0, 0.0).with_address("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Persistence(DbError::Query(_))));
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_last_reported_update_failure_is_tolerated() {
        let zone = GeoZone::new("Origin").with_center(0.0, 0.0);
        let device = Device::new("IMEI-1").assigned_to(zone.id);

        let mut directory = MockDeviceDirectory::new();
        let found = device.clone();
        directory
            .expect_find_device()
            .returning(move |_| Ok(Some(found.clone())));
        directory
            .expect_find_zone()
            .returning(move |_| Ok(Some(zone.clone())));
        directory
            .expect_record_last_reported()
            .times(1)
            .returning(|_, _| Err(DbError::Connection("node down".into())));

        let ledger = Arc::new(MemoryLedger::new());
        let alerts = Arc::new(MemoryAlertStore::new());
        let engine = TrackingEngine::new(
            TrackerConfig::default(),
            ledger.clone(),
            Arc::new(directory),
            alerts.clone(),
            metrics(),
        );

        let record = engine
            .report_location(LocationReport::new(device.id, 1.0, 0.0).with_address("x"))
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(record.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_alert_failure_keeps_record_and_propagates() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));

        let mut store = MockAlertStore::new();
        store
            .expect_insert()
            .returning(|_| Err(DbError::Query("alerts table unavailable".into())));

        let engine = TrackingEngine::new(
            TrackerConfig::default(),
            f.ledger.clone(),
            f.directory.clone(),
            Arc::new(store),
            metrics(),
        );

        let err = engine
            .report_location(LocationReport::new(device.id, 1.0, 0.0).with_address("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Persistence(_)));
        assert_eq!(f.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_last_location_is_latest_timestamp() {
        let f = fixture();
        let device_id = DeviceId::new();
        let now = Utc::now();

        for hours_ago in [5, 1, 3] {
            f.ledger
                .append(
                    NewLocationRecord::new(device_id, GeoPosition::new(hours_ago as f64, 0.0))
                        .at(now - TimeDelta::hours(hours_ago)),
                )
                .await
                .unwrap();
        }

        let last = f.engine.get_last_location(device_id).await.unwrap();
        assert_eq!(last.latitude, 1.0);

        let err = f.engine.get_last_location(DeviceId::new()).await.unwrap_err();
        assert!(matches!(err, TrackingError::Core(CoreError::NoLocationRecorded(_))));
    }

    #[tokio::test]
    async fn test_history_windows() {
        let f = fixture();
        let device_id = DeviceId::new();
        let now = Utc::now();

        for hours_ago in [48, 30, 10, 2] {
            f.ledger
                .append(
                    NewLocationRecord::new(device_id, GeoPosition::new(0.0, hours_ago as f64))
                        .at(now - TimeDelta::hours(hours_ago)),
                )
                .await
                .unwrap();
        }

        let bounded = f
            .engine
            .get_history(
                device_id,
                Some(now - TimeDelta::hours(31)),
                Some(now - TimeDelta::hours(10)),
            )
            .await
            .unwrap();
        let longitudes: Vec<f64> = bounded.iter().map(|r| r.longitude).collect();
        assert_eq!(longitudes, vec![30.0, 10.0]);

        let empty = f
            .engine
            .get_history(device_id, Some(now + TimeDelta::hours(1)), None)
            .await
            .unwrap();
        assert!(empty.is_empty());

        let recent = f.engine.get_recent_history(device_id, None).await.unwrap();
        let longitudes: Vec<f64> = recent.iter().map(|r| r.longitude).collect();
        assert_eq!(longitudes, vec![2.0, 10.0]);

        let all = f.engine.get_all_locations(device_id).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_device_status() {
        let f = fixture();
        let device = zoned_device(&f, "IMEI-1", (0.0, 0.0));

        let status = f.engine.get_device_status(device.id).await.unwrap();
        assert!(!status.online);
        assert!(status.last_seen.is_none());

        f.engine
            .report_location(LocationReport::new(device.id, 0.0, 0.0).with_address("Depot"))
            .await
            .unwrap();
        let status = f.engine.get_device_status(device.id).await.unwrap();
        assert!(status.online);
        assert_eq!(status.address.as_deref(), Some("Depot"));

        let stale = Device::new("IMEI-STALE");
        f.directory.insert_device(stale.clone());
        f.ledger
            .append(
                NewLocationRecord::new(stale.id, GeoPosition::new(0.0, 0.0))
                    .at(Utc::now() - TimeDelta::minutes(10)),
            )
            .await
            .unwrap();
        assert!(!f.engine.get_device_status(stale.id).await.unwrap().online);

        let err = f.engine.get_device_status(DeviceId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_recent_window_beyond_calendar_is_rejected() {
        let f = fixture();
        let device_id = DeviceId::new();

        let err = f
            .engine
            .get_recent_history(device_id, Some(u32::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Core(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unbounded_online_window_keeps_device_online() {
        let f = fixture_with(TrackerConfig {
            online_window_secs: u64::MAX,
            ..TrackerConfig::default()
        });
        let device = Device::new("IMEI-OLD");
        f.directory.insert_device(device.clone());
        f.ledger
            .append(
                NewLocationRecord::new(device.id, GeoPosition::new(0.0, 0.0))
                    .at(Utc::now() - TimeDelta::days(3650)),
            )
            .await
            .unwrap();

        assert!(f.engine.get_device_status(device.id).await.unwrap().online);
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_boundary_gaps_log_at_most_one_warning() {
        let f = fixture();
        let unzoned = Device::new("IMEI-NO-ZONE");
        let dangling = Device::new("IMEI-DANGLING").assigned_to(ZoneId::new());
        f.directory.insert_device(unzoned.clone());
        f.directory.insert_device(dangling.clone());

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        f.engine
            .report_location(LocationReport::new(unzoned.id, 5.0, 5.0).with_address("Field"))
            .await
            .unwrap();
        assert_eq!(warnings.load(Ordering::SeqCst), 0);

        f.engine
            .report_location(LocationReport::new(dangling.id, 5.0, 5.0).with_address("Field"))
            .await
            .unwrap();
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }
}
