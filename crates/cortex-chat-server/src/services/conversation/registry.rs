use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{RoutingConfig, SessionDefaults};
use crate::models::chat::SessionId;
use crate::services::query_router::TopicRouter;
use crate::services::search_gateway::{SearchGateway, SearchPlatform};
use crate::utils::error::ChatError;
use crate::utils::retry::RetryPolicy;

use super::controller::{CompletionService, ConversationController, ServiceRoutes};
use super::types::{SessionConfig, SessionSnapshot};

pub type SharedController = Arc<Mutex<ConversationController>>;

/// One registered session. The snapshot and gateway are read without
/// taking the controller lock, so views work while a turn is running.
#[derive(Clone)]
pub struct SessionEntry {
    controller: SharedController,
    snapshot: watch::Receiver<SessionSnapshot>,
    gateway: Arc<SearchGateway>,
    created_at: DateTime<Utc>,
}

impl SessionEntry {
    fn new(controller: ConversationController) -> Self {
        let snapshot = controller.subscribe();
        let gateway = controller.gateway();
        let created_at = controller.created_at();
        Self {
            controller: Arc::new(Mutex::new(controller)),
            snapshot,
            gateway,
            created_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Input is disabled until at least one search service exists.
    pub async fn input_enabled(&self) -> bool {
        self.gateway.has_backends().await
    }
}

/// Shared collaborators every new session is wired with.
#[derive(Clone)]
pub struct ControllerFactory {
    pub platform: Arc<dyn SearchPlatform>,
    pub completion: Arc<dyn CompletionService>,
    pub router: Arc<dyn TopicRouter>,
    pub routing: RoutingConfig,
    pub retry: RetryPolicy,
    pub defaults: SessionDefaults,
}

impl ControllerFactory {
    /// Each session gets its own gateway, so discovery is cached per session.
    pub fn build(&self) -> ConversationController {
        ConversationController::new(
            SessionConfig::from(&self.defaults),
            SearchGateway::new(self.platform.clone(), self.retry.clone()),
            self.completion.clone(),
            self.router.clone(),
            ServiceRoutes::from(&self.routing),
            self.defaults.strip_apostrophes,
        )
    }
}

/// Thread-safe in-memory session registry
/// Uses DashMap for concurrent access; each session sits behind its own
/// async mutex so turns within one session never overlap.
#[derive(Clone)]
pub struct SessionRegistry {
    storage: Arc<DashMap<SessionId, SessionEntry>>,
    factory: ControllerFactory,
}

impl SessionRegistry {
    pub fn new(factory: ControllerFactory) -> Self {
        info!("Initializing session registry with DashMap");
        Self {
            storage: Arc::new(DashMap::new()),
            factory,
        }
    }

    pub fn create(&self) -> (SessionId, SessionEntry) {
        let session_id = Uuid::new_v4();
        let entry = SessionEntry::new(self.factory.build());
        self.storage.insert(session_id, entry.clone());
        info!("Created session {} ({} active)", session_id, self.storage.len());
        (session_id, entry)
    }

    pub fn entry(&self, session_id: SessionId) -> Result<SessionEntry, ChatError> {
        self.storage
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(ChatError::SessionNotFound(session_id))
    }

    pub fn get(&self, session_id: SessionId) -> Result<SharedController, ChatError> {
        self.entry(session_id).map(|entry| entry.controller)
    }

    /// Exclusive access for a turn. Fails fast if one is already running.
    pub fn lock_for_turn(
        &self,
        session_id: SessionId,
    ) -> Result<OwnedMutexGuard<ConversationController>, ChatError> {
        self.get(session_id)?.try_lock_owned().map_err(|_| {
            debug!("Session {} busy, rejecting concurrent turn", session_id);
            ChatError::TurnInFlight
        })
    }

    pub fn remove(&self, session_id: SessionId) -> bool {
        let removed = self.storage.remove(&session_id).is_some();
        if removed {
            debug!("Removed session {}", session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop sessions idle for longer than `max_idle`. Sessions with a turn
    /// in flight are always kept. Returns the number removed.
    pub fn cleanup_idle(&self, max_idle: Duration) -> usize {
        let start_len = self.storage.len();
        self.storage
            .retain(|_, entry| match entry.controller.try_lock() {
                Ok(guard) => guard.last_activity().elapsed() < max_idle,
                Err(_) => true,
            });

        let count = start_len.saturating_sub(self.storage.len());
        if count > 0 {
            info!("Cleaned up {} idle sessions", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::controller::MockCompletionService;
    use crate::services::query_router::KeywordRouter;
    use crate::services::search_gateway::tests::FakePlatform;

    fn registry() -> SessionRegistry {
        let routing = RoutingConfig::default();
        SessionRegistry::new(ControllerFactory {
            platform: Arc::new(FakePlatform::with_default_services(Vec::new())),
            completion: Arc::new(MockCompletionService::new()),
            router: Arc::new(KeywordRouter::new(&routing.structured_keywords)),
            routing,
            retry: RetryPolicy::default(),
            defaults: SessionDefaults::default(),
        })
    }

    #[tokio::test]
    async fn test_registry_basic_operations() {
        let registry = registry();
        let (id, _) = registry.create();
        assert_eq!(registry.len(), 1);

        let controller = registry.get(id).unwrap();
        assert_eq!(controller.lock().await.config(), &SessionConfig::default());

        assert!(registry.remove(id));
        assert!(registry.is_empty());
        assert!(matches!(registry.get(id), Err(ChatError::SessionNotFound(_))));
        assert!(!registry.remove(id));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = registry();
        let (a, _) = registry.create();
        let (b, _) = registry.create();
        assert_ne!(a, b);

        registry.get(a).unwrap().lock().await.clear();
        let _busy = registry.lock_for_turn(a).unwrap();
        assert!(registry.lock_for_turn(b).is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_turn_is_rejected() {
        let registry = registry();
        let (id, _) = registry.create();

        let guard = registry.lock_for_turn(id).unwrap();
        assert!(matches!(registry.lock_for_turn(id), Err(ChatError::TurnInFlight)));

        drop(guard);
        assert!(registry.lock_for_turn(id).is_ok());
    }

    #[tokio::test]
    async fn test_snapshot_readable_while_turn_holds_session() {
        let registry = registry();
        let (id, entry) = registry.create();

        let mut guard = registry.lock_for_turn(id).unwrap();
        guard
            .update_config(&crate::models::chat::ConfigUpdate {
                num_chat_messages: Some(2),
                ..Default::default()
            })
            .unwrap();

        // the lock is still held here
        let snapshot = registry.entry(id).unwrap().snapshot();
        assert_eq!(snapshot.config.num_chat_messages, 2);
        assert_eq!(snapshot.phase, super::super::types::TurnPhase::Idle);
        assert!(entry.input_enabled().await);
        drop(guard);
    }

    #[tokio::test]
    async fn test_cleanup_idle_keeps_busy_sessions() {
        let registry = registry();
        let (idle, _) = registry.create();
        let (busy, _) = registry.create();
        let _guard = registry.lock_for_turn(busy).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(registry.cleanup_idle(Duration::from_millis(1)), 1);
        assert!(registry.get(idle).is_err());
        assert!(registry.get(busy).is_ok());

        assert_eq!(registry.cleanup_idle(Duration::from_secs(3600)), 0);
    }
}
