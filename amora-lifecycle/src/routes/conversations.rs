use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use amora_shared::errors::AppResult;
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::engine::Outcome;
use crate::models::{ConversationState, MatchMessage};
use crate::routes::{respond, validate};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "message body is required"))]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub archived: bool,
}

#[derive(Debug, Serialize)]
pub struct UnmatchResponse {
    pub removed: bool,
}

// --- POST /matches/:id/open ---

pub async fn open_conversation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConversationState>>> {
    let conversation = state.lifecycle.open_for_read(match_id, user.id, Utc::now())?;
    Ok(Json(ApiResponse::ok(conversation)))
}

// --- POST /matches/:id/messages ---

pub async fn send_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<MatchMessage>>> {
    validate(&req)?;
    let message = state.lifecycle.send_message(match_id, user.id, &req.body, Utc::now())?;
    Ok(Json(ApiResponse::ok(message)))
}

// --- POST /matches/:id/chat/start ---

pub async fn start_chat(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConversationState>>> {
    let outcome = state.lifecycle.start_chat(match_id, user.id, Utc::now())?;
    Ok(respond(&state, outcome).await)
}

// --- POST /matches/:id/end ---

pub async fn end_conversation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConversationState>>> {
    let conversation = state.lifecycle.end_conversation(match_id, user.id, Utc::now())?;
    Ok(Json(ApiResponse::ok(conversation)))
}

// --- POST /matches/:id/archive ---

pub async fn archive_thread(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ArchiveResponse>>> {
    let archived = state.lifecycle.archive_thread(match_id, user.id, Utc::now())?;
    Ok(Json(ApiResponse::ok(ArchiveResponse { archived })))
}

// --- DELETE /matches/:id ---

pub async fn unmatch(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UnmatchResponse>>> {
    let outcome = state.lifecycle.unmatch(match_id, user.id)?;
    let outcome = Outcome::with_effects(UnmatchResponse { removed: true }, outcome.effects);
    Ok(respond(&state, outcome).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_fails_validation() {
        let req = SendMessageRequest { body: String::new() };
        assert!(validate(&req).is_err());
        let req = SendMessageRequest { body: "hi".into() };
        assert!(validate(&req).is_ok());
    }
}
