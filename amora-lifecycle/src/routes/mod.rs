pub mod conversations;
pub mod dates;
pub mod health;
pub mod location;
pub mod perks;
pub mod wallet;

use axum::Json;
use serde::Serialize;
use validator::Validate;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::ApiResponse;

use crate::engine::Outcome;
use crate::events::publisher;
use crate::AppState;

pub(crate) fn validate<T: Validate>(req: &T) -> AppResult<()> {
    req.validate()
        .map_err(|e| AppError::invalid_argument(e.to_string()))
}

/// Publishes the outcome's effects, then wraps its value in the API envelope.
pub(crate) async fn respond<T: Serialize>(state: &AppState, outcome: Outcome<T>) -> Json<ApiResponse<T>> {
    publisher::dispatch(&state.rabbitmq, outcome.effects).await;
    Json(ApiResponse::ok(outcome.value))
}
