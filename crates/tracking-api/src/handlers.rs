//! API request handlers

use crate::error::ApiError;
use crate::state::AppState;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracking_core::{
    Alert, AlertId, AlertKind, AlertStatistics, DeviceId, DeviceStatus, LocationRecord, NewAlert,
    UserId,
};
use tracking_engine::LocationReport;
use uuid::Uuid;

// ============================================================================
// REQUEST & RESPONSE TYPES
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub database: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLocationRequest {
    pub device_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub recorded_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportByImeiRequest {
    pub imei: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertRequest {
    pub device_id: Uuid,
    pub message: String,
    pub alert_type: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AlertSearchParams {
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

// ============================================================================
// HEALTH & STATUS HANDLERS
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now().to_rfc3339(),
        database: if state.has_db() { "connected" } else { "in-memory" }.into(),
    })
}

/// Readiness check (for Kubernetes)
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ready = match &state.db {
        Some(db) => db.health_check().await,
        None => true,
    };
    state.metrics.set_db_connected(db_ready && state.has_db());

    if db_ready {
        (StatusCode::OK, Json(serde_json::json!({"ready": true})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"ready": false})),
        )
    }
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export(),
    )
}

// ============================================================================
// TRACKING HANDLERS
// ============================================================================

pub async fn report_location(
    State(state): State<AppState>,
    Json(req): Json<ReportLocationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut report = LocationReport::new(
        DeviceId::from_uuid(req.device_id),
        req.latitude,
        req.longitude,
    );
    report.address = req.address;
    report.recorded_by = req.recorded_by.map(UserId::from_uuid);

    let record = state.engine.report_location(report).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn report_location_by_imei(
    State(state): State<AppState>,
    Json(req): Json<ReportByImeiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let imei = req.imei.trim();
    if imei.is_empty() {
        return Err(ApiError::bad_request("imei must not be blank"));
    }

    let record = state
        .engine
        .report_location_by_imei(imei, req.latitude, req.longitude)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn current_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LocationRecord>, ApiError> {
    let record = state
        .engine
        .get_last_location(DeviceId::from_uuid(id))
        .await?;
    Ok(Json(record))
}

/// History between optional RFC 3339 bounds, oldest first
pub async fn location_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<LocationRecord>>, ApiError> {
    debug!(device_id = %id, from = ?params.from, to = ?params.to, "history query");
    let records = state
        .engine
        .get_history(DeviceId::from_uuid(id), params.from, params.to)
        .await?;
    Ok(Json(records))
}

pub async fn recent_locations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<LocationRecord>>, ApiError> {
    let records = state
        .engine
        .get_recent_history(DeviceId::from_uuid(id), params.hours)
        .await?;
    Ok(Json(records))
}

pub async fn all_locations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LocationRecord>>, ApiError> {
    let records = state
        .engine
        .get_all_locations(DeviceId::from_uuid(id))
        .await?;
    Ok(Json(records))
}

pub async fn device_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeviceStatus>, ApiError> {
    let status = state
        .engine
        .get_device_status(DeviceId::from_uuid(id))
        .await?;
    Ok(Json(status))
}

// ============================================================================
// ALERT HANDLERS
// ============================================================================

/// All alerts, or those whose message contains `search`
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertSearchParams>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = match params.search {
        Some(term) => state.engine.alerts().search(&term).await?,
        None => state.engine.alerts().list_all().await?,
    };
    Ok(Json(alerts))
}

pub async fn create_alert(
    State(state): State<AppState>,
    Json(req): Json<CreateAlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: AlertKind = req.alert_type.parse()?;
    let new = NewAlert::new(DeviceId::from_uuid(req.device_id), kind, req.message)
        .with_coordinates(req.latitude, req.longitude);

    let alert = state.engine.alerts().create(new).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.engine.alerts().get(AlertId::from_uuid(id)).await?;
    Ok(Json(alert))
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .engine
        .alerts()
        .resolve(AlertId::from_uuid(id))
        .await?;
    Ok(Json(alert))
}

pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.alerts().delete(AlertId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn device_unresolved_alerts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = state
        .engine
        .alerts()
        .list_unresolved_by_device(DeviceId::from_uuid(id))
        .await?;
    Ok(Json(alerts))
}

pub async fn owner_unresolved_alerts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = state
        .engine
        .alerts()
        .list_unresolved_by_owner(UserId::from_uuid(id))
        .await?;
    Ok(Json(alerts))
}

pub async fn owner_unresolved_count(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state
        .engine
        .alerts()
        .count_unresolved_by_owner(UserId::from_uuid(id))
        .await?;
    Ok(Json(CountResponse { count }))
}

pub async fn owner_alert_statistics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertStatistics>, ApiError> {
    let stats = state
        .engine
        .alerts()
        .statistics(UserId::from_uuid(id))
        .await?;
    Ok(Json(stats))
}
