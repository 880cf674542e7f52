use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use amora_shared::errors::AppResult;
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::date_plan::DateProposal;
use crate::models::DatePlan;
use crate::routes::{respond, validate};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ProposeDateRequest {
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    #[validate(length(min = 1, max = 120))]
    pub activity_label: String,
    #[validate(length(min = 1, max = 200))]
    pub place_label: String,
    #[validate(length(min = 1, max = 255))]
    pub place_id: String,
}

impl From<ProposeDateRequest> for DateProposal {
    fn from(req: ProposeDateRequest) -> Self {
        Self {
            date_start: req.date_start,
            date_end: req.date_end,
            activity_label: req.activity_label,
            place_label: req.place_label,
            place_id: req.place_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RespondDateRequest {
    pub accept: bool,
}

// --- GET /matches/:id/date ---

pub async fn get_date(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DatePlan>>> {
    let outcome = state.lifecycle.get_date_plan(match_id, user.id, Utc::now())?;
    Ok(respond(&state, outcome).await)
}

// --- POST /matches/:id/date ---

pub async fn propose_date(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(req): Json<ProposeDateRequest>,
) -> AppResult<Json<ApiResponse<DatePlan>>> {
    validate(&req)?;
    let outcome = state.lifecycle.propose_date(match_id, user.id, req.into(), Utc::now())?;
    Ok(respond(&state, outcome).await)
}

// --- POST /matches/:id/date/respond ---

pub async fn respond_to_date(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(req): Json<RespondDateRequest>,
) -> AppResult<Json<ApiResponse<DatePlan>>> {
    let outcome = state.lifecycle.respond_to_date(match_id, user.id, req.accept, Utc::now())?;
    Ok(respond(&state, outcome).await)
}

// --- POST /matches/:id/date/cancel ---

pub async fn cancel_date(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DatePlan>>> {
    let outcome = state.lifecycle.cancel_date(match_id, user.id, Utc::now())?;
    Ok(respond(&state, outcome).await)
}
