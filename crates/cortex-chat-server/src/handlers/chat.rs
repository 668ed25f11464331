use std::time::Instant;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::models::chat::*;
use crate::services::conversation::SessionRegistry;
use crate::utils::error::ApiError;

/// Run one conversation turn. A second request for the same session while
/// one is running gets 409 instead of queueing behind it.
pub async fn ask_handler(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let start_time = Instant::now();

    info!(
        "Ask request: session={}, question_len={}",
        session_id,
        request.question.len()
    );

    let mut controller = registry.lock_for_turn(session_id)?;
    let outcome = controller.ask(&request.question).await?;

    info!(
        "Ask completed: session={}, reply_len={}, elapsed={:?}",
        session_id,
        outcome.reply.len(),
        start_time.elapsed()
    );

    Ok(Json(AskResponse {
        session_id,
        reply: outcome.reply,
        diagnostics: outcome.diagnostics,
    }))
}
