use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use amora_shared::errors::AppResult;
use amora_shared::middleware::ServiceCaller;
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::models::Wallet;
use crate::routes::validate;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreditRequest {
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount_cents: i64,
    /// Purchase reference; replays with the same reference are no-ops.
    #[validate(length(min = 1, max = 128))]
    pub reference: String,
}

// --- GET /wallet ---

pub async fn get_wallet(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Wallet>>> {
    let wallet = state.lifecycle.wallet(user.id, Utc::now())?;
    Ok(Json(ApiResponse::ok(wallet)))
}

// --- POST /internal/wallets/:user_id/credit ---

pub async fn credit_wallet(
    ServiceCaller(caller): ServiceCaller,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<CreditRequest>,
) -> AppResult<Json<ApiResponse<Wallet>>> {
    validate(&req)?;
    tracing::info!(user_id = %user_id, caller = %caller.id, amount_cents = req.amount_cents, "wallet top-up");
    let wallet = state.lifecycle.credit(user_id, req.amount_cents, &req.reference, Utc::now())?;
    Ok(Json(ApiResponse::ok(wallet)))
}
