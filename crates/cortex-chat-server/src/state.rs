use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Settings;
use crate::services::conversation::SessionRegistry;
use crate::services::search_gateway::SearchPlatform;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub platform: Arc<dyn SearchPlatform>,
    pub settings: Settings,
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}
