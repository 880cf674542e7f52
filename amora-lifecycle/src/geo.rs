use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Policy;
use crate::models::DatePlan;

/// Most recent position a client reported for a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub user_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proximity {
    Together { distance_m: f64 },
    Apart { distance_m: f64 },
    /// A report is missing or too old to trust.
    Unknown,
}

/// Great-circle distance in metres.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64, radius_m: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    radius_m * c
}

/// Distances are compared at millimetre precision so a pair reported exactly
/// on the fence is not pushed out by float noise.
pub fn within_radius(distance_m: f64, radius_m: f64) -> bool {
    (distance_m * 1000.0).round() / 1000.0 <= radius_m
}

pub fn is_fresh(report: &LocationReport, now: DateTime<Utc>, max_age: Duration) -> bool {
    now - report.captured_at <= max_age
}

pub fn evaluate(
    a: Option<&LocationReport>,
    b: Option<&LocationReport>,
    now: DateTime<Utc>,
    policy: &Policy,
) -> Proximity {
    let max_age = policy.location_max_age();
    let (Some(a), Some(b)) = (a, b) else {
        return Proximity::Unknown;
    };
    if !is_fresh(a, now, max_age) || !is_fresh(b, now, max_age) {
        return Proximity::Unknown;
    }

    let distance_m = haversine_m(a.lat, a.lng, b.lat, b.lng, policy.earth_radius_m);
    if within_radius(distance_m, policy.geofence_radius_m) {
        Proximity::Together { distance_m }
    } else {
        Proximity::Apart { distance_m }
    }
}

/// Geofencing only runs from `date_start - margin` to `(date_end or date_start) + margin`.
pub fn in_geofence_window(plan: &DatePlan, now: DateTime<Utc>, margin: Duration) -> bool {
    let Some(start) = plan.date_start else {
        return false;
    };
    let end = plan.date_end.unwrap_or(start);
    now >= start - margin && now <= end + margin
}
