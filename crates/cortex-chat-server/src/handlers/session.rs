use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::models::chat::*;
use crate::services::conversation::{SessionConfig, SessionRegistry, TurnPhase};
use crate::state::AppState;
use crate::utils::error::ApiError;

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: ModelId::ALL.to_vec(),
        default_model: state.settings.session.default_model,
    })
}

pub async fn create_session(
    State(registry): State<SessionRegistry>,
) -> (StatusCode, Json<SessionCreated>) {
    let (session_id, entry) = registry.create();

    // first look at the platform happens here, not on the first question
    let input_enabled = entry.input_enabled().await;
    if !input_enabled {
        info!("Session {} created with no search services, input disabled", session_id);
    }

    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id,
            config: entry.snapshot().config,
            input_enabled,
        }),
    )
}

/// Reads the published snapshot, so a running turn shows its current phase
/// instead of blocking the request.
pub async fn get_session(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionView>, ApiError> {
    let entry = registry.entry(session_id)?;
    let snapshot = entry.snapshot();
    let input_enabled = snapshot.phase == TurnPhase::Idle && entry.input_enabled().await;

    Ok(Json(SessionView {
        session_id,
        messages: snapshot.messages,
        config: snapshot.config,
        phase: snapshot.phase,
        created_at: entry.created_at(),
        input_enabled,
    }))
}

pub async fn delete_session(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    if registry.remove(session_id) {
        info!("Session {} deleted", session_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session not found: {}", session_id)))
    }
}

pub async fn update_config(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<SessionId>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<SessionConfig>, ApiError> {
    let mut controller = registry.lock_for_turn(session_id)?;
    let config = controller.update_config(&update)?.clone();
    Ok(Json(config))
}

/// Reset the conversation. Configuration survives.
pub async fn clear_conversation(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    let mut controller = registry.lock_for_turn(session_id)?;
    controller.clear();
    Ok(StatusCode::NO_CONTENT)
}
