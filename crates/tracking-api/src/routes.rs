//! API route definitions

use crate::handlers;
use crate::state::AppState;

use axum::{
    Router,
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = if state.config.cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:8080"))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        // Health & Status
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Metrics (Prometheus format)
        .route("/metrics", get(handlers::metrics))
        // Tracking API
        .route(
            "/api/v1/tracking/report-location",
            post(handlers::report_location),
        )
        .route(
            "/api/v1/tracking/report-location-by-imei",
            post(handlers::report_location_by_imei),
        )
        .route(
            "/api/v1/tracking/devices/{id}/current-location",
            get(handlers::current_location),
        )
        .route(
            "/api/v1/tracking/devices/{id}/history",
            get(handlers::location_history),
        )
        .route(
            "/api/v1/tracking/devices/{id}/recent",
            get(handlers::recent_locations),
        )
        .route(
            "/api/v1/tracking/devices/{id}/all-locations",
            get(handlers::all_locations),
        )
        .route(
            "/api/v1/tracking/devices/{id}/status",
            get(handlers::device_status),
        )
        // Alerts API
        .route(
            "/api/v1/alerts",
            get(handlers::list_alerts).post(handlers::create_alert),
        )
        .route(
            "/api/v1/alerts/{id}",
            get(handlers::get_alert).delete(handlers::delete_alert),
        )
        .route("/api/v1/alerts/{id}/resolve", post(handlers::resolve_alert))
        .route(
            "/api/v1/alerts/devices/{id}/unresolved",
            get(handlers::device_unresolved_alerts),
        )
        .route(
            "/api/v1/alerts/owners/{id}/unresolved",
            get(handlers::owner_unresolved_alerts),
        )
        .route(
            "/api/v1/alerts/owners/{id}/unresolved/count",
            get(handlers::owner_unresolved_count),
        )
        .route(
            "/api/v1/alerts/owners/{id}/statistics",
            get(handlers::owner_alert_statistics),
        )
        // Apply middleware
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            track_request_metrics,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Record method, matched route and status of every routed request
async fn track_request_metrics(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    state.metrics.record_api_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// TESTS
// ============================================================================
