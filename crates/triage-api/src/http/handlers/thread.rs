//! Thread history endpoint.
//!
//! - GET /api/v1/threads/{id} - recorded turns of a conversation thread

use std::time::Instant;

use axum::extract::{Path, State};
use serde::Serialize;
use uuid::Uuid;

use triage_core::store::ConversationStore;
use triage_types::chat::ConversationTurn;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ThreadView {
    pub thread_id: Uuid,
    pub turns: Vec<ConversationTurn>,
}

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// GET /api/v1/threads/{id}
pub async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ThreadView>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let thread_id = parse_uuid(&id)?;

    if !state.store.thread_exists(&thread_id).await? {
        return Err(AppError::NotFound(format!("Thread {thread_id} not found")));
    }
    let turns = state.store.load_history(&thread_id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(ApiResponse::success(ThreadView { thread_id, turns }, request_id, elapsed))
}
