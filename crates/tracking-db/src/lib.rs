//! # Tracking DB - Persistence
//!
//! Storage ports for the location ledger, alert store and device directory,
//! with in-memory adapters and ScyllaDB adapters behind the same traits.

pub mod error;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod store;

pub use error::{DbError, DbResult};
pub use memory::{MemoryAlertStore, MemoryDirectory, MemoryLedger};
pub use repository::{ScyllaAlertStore, ScyllaDirectory, ScyllaLedger};
pub use store::{AlertStore, DeviceDirectory, LocationLedger};

#[cfg(any(test, feature = "testing"))]
pub use store::{MockAlertStore, MockDeviceDirectory, MockLocationLedger};

use scylla::{Session, SessionBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u32,
    pub connection_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: "device_tracking".to_string(),
            replication_factor: 1,
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let hosts = std::env::var("SCYLLA_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.hosts);

        let keyspace = std::env::var("SCYLLA_KEYSPACE").unwrap_or(defaults.keyspace);

        let replication_factor = std::env::var("SCYLLA_REPLICATION_FACTOR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.replication_factor);

        Self {
            hosts,
            keyspace,
            replication_factor,
            ..Default::default()
        }
    }

}

/// Connected ScyllaDB client handing out the storage adapters
pub struct DbClient {
    session: Arc<Session>,
}

impl DbClient {
    /// Connect and bring the schema up to date
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        if config.hosts.is_empty() {
            return Err(DbError::Configuration("no ScyllaDB hosts configured".into()));
        }

        info!("Connecting to ScyllaDB cluster: {:?}", config.hosts);

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .connection_timeout(config.connection_timeout)
            .build()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let session = Arc::new(session);
        info!("Connected to ScyllaDB");

        migrations::run_all(&session, &config).await?;

        Ok(Self { session })
    }

    pub fn ledger(&self) -> Arc<ScyllaLedger> {
        Arc::new(ScyllaLedger::new(self.session.clone()))
    }

    pub fn alerts(&self) -> Arc<ScyllaAlertStore> {
        Arc::new(ScyllaAlertStore::new(self.session.clone()))
    }

    pub fn directory(&self) -> Arc<ScyllaDirectory> {
        Arc::new(ScyllaDirectory::new(self.session.clone()))
    }

    pub async fn health_check(&self) -> bool {
        match self
            .session
            .query_unpaged("SELECT now() FROM system.local", ())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                false
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
