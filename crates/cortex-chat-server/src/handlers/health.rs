use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    search_services: Vec<String>,
}

/// Ready once the platform answers and lists at least one search service.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state.platform.list_services().await {
        Ok(services) if !services.is_empty() => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                search_services: services.into_iter().map(|d| d.name).collect(),
            }),
        ),
        Ok(_) => {
            warn!("Readiness: no search services registered");
            not_ready()
        }
        Err(e) => {
            warn!("Readiness: search platform unreachable: {}", e);
            not_ready()
        }
    }
}

fn not_ready() -> (StatusCode, Json<ReadinessResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadinessResponse {
            ready: false,
            search_services: Vec::new(),
        }),
    )
}
