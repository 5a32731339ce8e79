//! Circular geofence evaluation

use tracing::{debug, warn};
use tracking_core::{Device, DeviceId, GeoPosition, GeoZone, ZoneId};

/// A report that landed outside the device's assigned zone
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceViolation {
    pub device_id: DeviceId,
    pub zone_id: ZoneId,
    pub distance_km: f64,
    pub position: GeoPosition,
    pub message: String,
}

/// Decides whether a position lies beyond the configured radius of a zone center
#[derive(Debug, Clone, Copy)]
pub struct GeofenceEvaluator {
    radius_km: f64,
}

impl GeofenceEvaluator {
    pub fn new(radius_km: f64) -> Self {
        Self { radius_km }
    }

    /// `zone` is the device's resolved boundary, `None` when it has none.
    ///
    /// A distance exactly equal to the radius is inside.
    pub fn evaluate(
        &self,
        device: &Device,
        zone: Option<&GeoZone>,
        position: GeoPosition,
    ) -> Option<GeofenceViolation> {
        let Some(zone) = zone else {
            debug!(device_id = %device.id, "no assigned boundary, skipping geofence check");
            return None;
        };

        let Some(center) = zone.center().filter(GeoPosition::is_valid) else {
            warn!(
                device_id = %device.id,
                zone_id = %zone.id,
                "assigned boundary has no usable center, skipping geofence check"
            );
            return None;
        };

        let distance_km = center.distance_to(&position);
        debug!(device_id = %device.id, zone_id = %zone.id, distance_km, "geofence distance");

        if distance_km <= self.radius_km {
            return None;
        }

        Some(GeofenceViolation {
            device_id: device.id,
            zone_id: zone.id,
            distance_km,
            position,
            message: format!(
                "Device (IMEI: {}) left assigned area '{}'. Distance from center: {:.2} km.",
                device.imei, zone.name, distance_km
            ),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
