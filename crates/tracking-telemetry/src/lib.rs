//! # Tracking Telemetry - Metrics
//!
//! Prometheus metrics for the device tracking service:
//! - Location report throughput, latency and failures
//! - Geofence violations and alert lifecycle
//! - Reverse geocoder health
//! - Database connectivity and API traffic

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing::{info, warn};
use tracking_core::AlertKind;

/// Metrics collector for the tracking service
pub struct MetricsCollector {
    registry: Registry,

    // Location reports
    location_reports_total: IntCounter,
    report_failures_total: IntCounterVec,
    report_duration: Histogram,

    // Alerts
    geofence_violations_total: IntCounter,
    alerts_created_total: IntCounterVec,
    alerts_resolved_total: IntCounter,

    // Geocoder
    geocoder_failures_total: IntCounter,

    // Database
    db_connection_status: IntGauge,

    // API
    api_requests_total: IntCounterVec,
    api_request_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let location_reports_total = IntCounter::new(
            "device_tracking_location_reports_total",
            "Location reports persisted",
        )?;
        registry.register(Box::new(location_reports_total.clone()))?;

        let report_failures_total = IntCounterVec::new(
            Opts::new(
                "device_tracking_report_failures_total",
                "Location reports rejected or failed",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(report_failures_total.clone()))?;

        let report_duration = Histogram::with_opts(
            HistogramOpts::new(
                "device_tracking_report_duration_seconds",
                "End-to-end location report processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(report_duration.clone()))?;

        let geofence_violations_total = IntCounter::new(
            "device_tracking_geofence_violations_total",
            "Reports that fell outside the device's assigned zone",
        )?;
        registry.register(Box::new(geofence_violations_total.clone()))?;

        let alerts_created_total = IntCounterVec::new(
            Opts::new("device_tracking_alerts_created_total", "Alerts created"),
            &["kind"],
        )?;
        registry.register(Box::new(alerts_created_total.clone()))?;

        let alerts_resolved_total = IntCounter::new(
            "device_tracking_alerts_resolved_total",
            "Alerts resolved",
        )?;
        registry.register(Box::new(alerts_resolved_total.clone()))?;

        let geocoder_failures_total = IntCounter::new(
            "device_tracking_geocoder_failures_total",
            "Reverse geocoding lookups that fell back to a placeholder",
        )?;
        registry.register(Box::new(geocoder_failures_total.clone()))?;

        let db_connection_status = IntGauge::new(
            "device_tracking_db_connected",
            "Database connection status",
        )?;
        registry.register(Box::new(db_connection_status.clone()))?;

        let api_requests_total = IntCounterVec::new(
            Opts::new("device_tracking_api_requests_total", "API requests"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(api_requests_total.clone()))?;

        let api_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "device_tracking_api_request_duration_seconds",
                "API request duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "path"],
        )?;
        registry.register(Box::new(api_request_duration.clone()))?;

        info!("Metrics collector initialized");

        Ok(Self {
            registry,
            location_reports_total,
            report_failures_total,
            report_duration,
            geofence_violations_total,
            alerts_created_total,
            alerts_resolved_total,
            geocoder_failures_total,
            db_connection_status,
            api_requests_total,
            api_request_duration,
        })
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    // ========================================================================
    // LOCATION REPORTS
    // ========================================================================

    pub fn record_location_report(&self, duration_secs: f64) {
        self.location_reports_total.inc();
        self.report_duration.observe(duration_secs);
    }

    /// `reason` is a short stable label such as `device_not_found`
    pub fn record_report_failure(&self, reason: &str) {
        self.report_failures_total.with_label_values(&[reason]).inc();
    }

    // ========================================================================
    // ALERTS
    // ========================================================================

    pub fn record_geofence_violation(&self) {
        self.geofence_violations_total.inc();
    }

    pub fn record_alert_created(&self, kind: AlertKind) {
        self.alerts_created_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn record_alert_resolved(&self) {
        self.alerts_resolved_total.inc();
    }

    // ========================================================================
    // GEOCODER
    // ========================================================================

    pub fn record_geocoder_failure(&self) {
        self.geocoder_failures_total.inc();
    }

    // ========================================================================
    // DATABASE METRICS
    // ========================================================================

    pub fn set_db_connected(&self, connected: bool) {
        self.db_connection_status.set(if connected { 1 } else { 0 });
    }

    // ========================================================================
    // API METRICS
    // ========================================================================

    /// Record API request
    pub fn record_api_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        self.api_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.api_request_duration
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

// ============================================================================
// TESTS
// ============================================================================
