//! Database migrations

use crate::{DbConfig, DbError, DbResult};
use scylla::Session;
use std::sync::Arc;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

/// Tables owned by this service plus the directory tables it reads
const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        id int PRIMARY KEY,
        version int
    )",
    "CREATE TABLE IF NOT EXISTS location_history (
        device_id uuid,
        recorded_at timestamp,
        record_id uuid,
        latitude double,
        longitude double,
        recorded_address text,
        recorded_by uuid,
        PRIMARY KEY ((device_id), recorded_at, record_id)
    ) WITH CLUSTERING ORDER BY (recorded_at DESC, record_id ASC)",
    "CREATE TABLE IF NOT EXISTS alerts (
        alert_id uuid PRIMARY KEY,
        device_id uuid,
        message text,
        alert_kind text,
        latitude double,
        longitude double,
        location_record_id uuid,
        created_at timestamp,
        resolved boolean,
        resolved_at timestamp
    )",
    "CREATE TABLE IF NOT EXISTS alerts_by_device (
        device_id uuid,
        created_at timestamp,
        alert_id uuid,
        message text,
        alert_kind text,
        latitude double,
        longitude double,
        location_record_id uuid,
        resolved boolean,
        resolved_at timestamp,
        PRIMARY KEY ((device_id), created_at, alert_id)
    ) WITH CLUSTERING ORDER BY (created_at DESC, alert_id ASC)",
    "CREATE TABLE IF NOT EXISTS alerts_by_location_record (
        location_record_id uuid,
        alert_id uuid,
        device_id uuid,
        message text,
        alert_kind text,
        latitude double,
        longitude double,
        created_at timestamp,
        resolved boolean,
        resolved_at timestamp,
        PRIMARY KEY ((location_record_id), alert_id)
    )",
    "CREATE TABLE IF NOT EXISTS devices (
        device_id uuid PRIMARY KEY,
        imei text,
        serial_number text,
        owner_id uuid,
        zone_id uuid,
        last_reported_at timestamp
    )",
    "CREATE TABLE IF NOT EXISTS devices_by_imei (
        imei text PRIMARY KEY,
        device_id uuid
    )",
    "CREATE TABLE IF NOT EXISTS devices_by_owner (
        owner_id uuid,
        device_id uuid,
        PRIMARY KEY ((owner_id), device_id)
    )",
    "CREATE TABLE IF NOT EXISTS users (
        user_id uuid PRIMARY KEY,
        display_name text
    )",
    "CREATE TABLE IF NOT EXISTS geo_zones (
        zone_id uuid PRIMARY KEY,
        name text,
        center_latitude double,
        center_longitude double
    )",
];

/// Create the keyspace and tables, then record the schema version
pub async fn run_all(session: &Arc<Session>, config: &DbConfig) -> DbResult<()> {
    info!("Running database migrations...");

    let create_keyspace = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        config.keyspace, config.replication_factor
    );
    session
        .query_unpaged(create_keyspace, ())
        .await
        .map_err(|e| DbError::Migration(e.to_string()))?;

    session
        .use_keyspace(&config.keyspace, false)
        .await
        .map_err(|e| DbError::Migration(e.to_string()))?;

    for statement in TABLES {
        session
            .query_unpaged(*statement, ())
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
    }
    debug!(tables = TABLES.len(), "schema statements applied");

    let version = get_schema_version(session).await?;
    info!("Current schema version: {}", version);

    if version < SCHEMA_VERSION {
        session
            .query_unpaged(
                "INSERT INTO schema_version (id, version) VALUES (1, ?)",
                (SCHEMA_VERSION,),
            )
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Schema upgraded to version {}", SCHEMA_VERSION);
    }

    info!("Migrations complete");
    Ok(())
}

/// Get current schema version, 0 when none was recorded
async fn get_schema_version(session: &Arc<Session>) -> DbResult<i32> {
    let result = session
        .query_unpaged("SELECT version FROM schema_version WHERE id = 1", ())
        .await
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let rows = result
        .into_rows_result()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let version = rows
        .maybe_first_row::<(Option<i32>,)>()
        .map_err(|e| DbError::Migration(e.to_string()))?
        .and_then(|(version,)| version)
        .unwrap_or(0);

    Ok(version)
}
