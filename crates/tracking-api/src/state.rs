//! Application state management

use crate::config::ApiConfig;

use std::sync::Arc;
use tracing::info;
use tracking_core::{Device, GeoZone, User};
use tracking_db::{
    AlertStore, DbClient, DeviceDirectory, LocationLedger, MemoryAlertStore, MemoryDirectory,
    MemoryLedger,
};
use tracking_engine::{NominatimGeocoder, TrackingEngine};
use tracking_telemetry::MetricsCollector;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: ApiConfig,
    /// Database client (absent in degraded mode)
    pub db: Option<Arc<DbClient>>,
    /// Ingestion and alerting
    pub engine: Arc<TrackingEngine>,
    /// Prometheus metrics
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// Connect to ScyllaDB and build the engine over its adapters
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(
            MetricsCollector::new().map_err(|e| anyhow::anyhow!("metrics registry: {e}"))?,
        );

        let db = DbClient::new(config.db.clone()).await?;
        info!("Database connected");
        metrics.set_db_connected(true);

        let engine = build_engine(&config, db.ledger(), db.directory(), db.alerts(), &metrics)?;

        Ok(Self {
            config,
            db: Some(Arc::new(db)),
            engine: Arc::new(engine),
            metrics,
        })
    }

    /// Create state without database (degraded mode)
    pub fn new_without_db(config: ApiConfig) -> anyhow::Result<Self> {
        let directory = Arc::new(MemoryDirectory::new());
        if config.demo_seed {
            seed_demo_directory(&directory);
        }
        Self::in_memory(config, directory)
    }

    /// In-memory adapters over the given directory
    pub fn in_memory(config: ApiConfig, directory: Arc<MemoryDirectory>) -> anyhow::Result<Self> {
        let metrics = Arc::new(
            MetricsCollector::new().map_err(|e| anyhow::anyhow!("metrics registry: {e}"))?,
        );
        metrics.set_db_connected(false);

        let engine = build_engine(
            &config,
            Arc::new(MemoryLedger::new()),
            directory,
            Arc::new(MemoryAlertStore::new()),
            &metrics,
        )?;

        Ok(Self {
            config,
            db: None,
            engine: Arc::new(engine),
            metrics,
        })
    }

    /// Check if database is available
    pub fn has_db(&self) -> bool {
        self.db.is_some()
    }
}

fn build_engine(
    config: &ApiConfig,
    ledger: Arc<dyn LocationLedger>,
    directory: Arc<dyn DeviceDirectory>,
    alerts: Arc<dyn AlertStore>,
    metrics: &Arc<MetricsCollector>,
) -> anyhow::Result<TrackingEngine> {
    let engine = TrackingEngine::new(
        config.tracker.clone(),
        ledger,
        directory,
        alerts,
        metrics.clone(),
    );

    if !config.geocoder.enabled {
        info!("Reverse geocoding disabled");
        return Ok(engine);
    }

    let geocoder = NominatimGeocoder::new(&config.geocoder)?;
    info!("Reverse geocoding via {}", config.geocoder.base_url);
    Ok(engine.with_geocoder(Arc::new(geocoder)))
}

/// Demo zone around central Kigali with one owned device
fn seed_demo_directory(directory: &MemoryDirectory) {
    let owner = User::new("Demo Owner");
    let zone = GeoZone::new("Kigali City Center").with_center(-1.9441, 30.0619);
    let device = Device::new("356938035643809")
        .with_serial_number("DEMO-0001")
        .owned_by(owner.id)
        .assigned_to(zone.id);

    info!(
        device_id = %device.id,
        imei = %device.imei,
        owner_id = %owner.id,
        zone_id = %zone.id,
        "Seeded demo device into in-memory directory"
    );

    directory.insert_user(owner);
    directory.insert_zone(zone);
    directory.insert_device(device);
}
