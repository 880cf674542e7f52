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

use crate::drink_perk::PerkView;
use crate::models::DrinkPerk;
use crate::routes::{respond, validate};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemPerkRequest {
    #[validate(length(equal = 64, message = "malformed unlock token"))]
    pub token: String,
}

// --- GET /matches/:id/perk ---

/// Polled by both clients while a date is on. Each poll is one geofencing sample.
pub async fn get_perk(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PerkView>>> {
    let m = state.lifecycle.authorize(match_id, user.id)?;
    let reports = state.locations.latest_for(&m.participants()).await;
    let outcome = state.lifecycle.evaluate_perk(m.id, user.id, &reports, Utc::now())?;
    Ok(respond(&state, outcome).await)
}

// --- POST /internal/matches/:id/perk/redeem ---

pub async fn redeem_perk(
    ServiceCaller(caller): ServiceCaller,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(req): Json<RedeemPerkRequest>,
) -> AppResult<Json<ApiResponse<DrinkPerk>>> {
    validate(&req)?;
    tracing::debug!(match_id = %match_id, caller = %caller.id, "redeem requested");
    let outcome = state.lifecycle.redeem_perk(match_id, &req.token, Utc::now())?;
    Ok(respond(&state, outcome).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drink_perk::generate_unlock_token;

    #[test]
    fn only_full_length_tokens_validate() {
        assert!(validate(&RedeemPerkRequest { token: generate_unlock_token() }).is_ok());
        assert!(validate(&RedeemPerkRequest { token: "abc".into() }).is_err());
    }
}
