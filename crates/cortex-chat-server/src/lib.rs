pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::config::Settings;
use crate::services::conversation::{CompletionService, ControllerFactory, SessionRegistry};
use crate::services::query_router::KeywordRouter;
use crate::services::search_gateway::SearchPlatform;
use crate::state::AppState;

/// Wire shared state from settings and the two platform services.
pub fn build_state(
    settings: Settings,
    platform: Arc<dyn SearchPlatform>,
    completion: Arc<dyn CompletionService>,
) -> AppState {
    let router = Arc::new(KeywordRouter::new(&settings.routing.structured_keywords));

    let registry = SessionRegistry::new(ControllerFactory {
        platform: platform.clone(),
        completion,
        router,
        routing: settings.routing.clone(),
        retry: settings.retry.clone(),
        defaults: settings.session.clone(),
    });

    AppState {
        registry,
        platform,
        settings,
    }
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let api_routes = Router::new()
        .route("/api/models", get(handlers::session::list_models))
        .route("/api/sessions", post(handlers::session::create_session))
        .route(
            "/api/sessions/{id}",
            get(handlers::session::get_session).delete(handlers::session::delete_session),
        )
        .route(
            "/api/sessions/{id}/config",
            patch(handlers::session::update_config),
        )
        .route(
            "/api/sessions/{id}/messages",
            post(handlers::chat::ask_handler).delete(handlers::session::clear_conversation),
        );

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .with_state(state)
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
}
