use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::geo::LocationReport;
use crate::routes::validate;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LocationRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    /// Device capture time; defaults to receipt time.
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub accepted: bool,
}

impl LocationRequest {
    /// Reports stamped in the future are pinned to `now`.
    fn into_report(self, user: &AuthUser, now: DateTime<Utc>) -> LocationReport {
        let captured_at = self.captured_at.map_or(now, |t| t.min(now));
        LocationReport { user_id: user.id, lat: self.lat, lng: self.lng, captured_at }
    }
}

// --- POST /location ---

pub async fn report_location(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<LocationRequest>,
) -> AppResult<Json<ApiResponse<LocationResponse>>> {
    validate(&req)?;
    let report = req.into_report(&user, Utc::now());
    let accepted = state
        .locations
        .record(&report)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(LocationResponse { accepted })))
}
