use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::RoutingConfig;
use crate::models::chat::{ConfigUpdate, Message, ModelId};
use crate::services::history_summarizer::HistorySummarizer;
use crate::services::prompt_builder::PromptBuilder;
use crate::services::query_router::{Classification, TopicRouter};
use crate::services::search_gateway::SearchGateway;
use crate::utils::error::ChatError;
use crate::utils::token_estimator::estimate_tokens;

use super::types::{SessionConfig, SessionSnapshot, SessionState, TurnPhase};

/// Trait for the hosted completion service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, model: ModelId, prompt: &str) -> Result<String, ChatError>;
}

/// Read-only view of how a turn was answered. Only produced in debug mode.
#[derive(Debug, Clone, Serialize)]
pub struct TurnDiagnostics {
    pub search_query: String,
    pub rewritten: bool,
    pub classification: Classification,
    pub service: String,
    pub context: String,
    pub prompt_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub diagnostics: Option<TurnDiagnostics>,
}

/// Maps a classification onto a configured search service name.
#[derive(Debug, Clone)]
pub struct ServiceRoutes {
    structured: String,
    unstructured: String,
}

impl ServiceRoutes {
    pub fn service_for(&self, classification: Classification) -> &str {
        match classification {
            Classification::Structured => &self.structured,
            Classification::Unstructured => &self.unstructured,
        }
    }
}

impl From<&RoutingConfig> for ServiceRoutes {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            structured: config.structured_service.clone(),
            unstructured: config.unstructured_service.clone(),
        }
    }
}

/// Drives one session's conversation, one turn at a time.
///
/// Idle -> AwaitingRewrite (only with usable history) -> Retrieving ->
/// Completing -> Idle. The log is only written after the whole pipeline
/// succeeds. Every phase change and log change is published as a
/// [`SessionSnapshot`] so observers never need the session lock.
pub struct ConversationController {
    state: SessionState,
    phase: TurnPhase,
    snapshot: watch::Sender<SessionSnapshot>,
    gateway: Arc<SearchGateway>,
    summarizer: HistorySummarizer,
    completion: Arc<dyn CompletionService>,
    router: Arc<dyn TopicRouter>,
    routes: ServiceRoutes,
    strip_apostrophes: bool,
    created_at: DateTime<Utc>,
    last_activity: Instant,
}

impl ConversationController {
    pub fn new(
        config: SessionConfig,
        gateway: SearchGateway,
        completion: Arc<dyn CompletionService>,
        router: Arc<dyn TopicRouter>,
        routes: ServiceRoutes,
        strip_apostrophes: bool,
    ) -> Self {
        let state = SessionState::new(config);
        let (snapshot, _) = watch::channel(state.snapshot(TurnPhase::Idle));
        Self {
            state,
            phase: TurnPhase::Idle,
            snapshot,
            gateway: Arc::new(gateway),
            summarizer: HistorySummarizer::new(completion.clone()),
            completion,
            router,
            routes,
            strip_apostrophes,
            created_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// The session's gateway, usable without holding the session.
    pub fn gateway(&self) -> Arc<SearchGateway> {
        self.gateway.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.state.config
    }

    pub fn messages(&self) -> &[Message] {
        self.state.log.messages()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Input is disabled until at least one search service exists.
    pub async fn input_enabled(&self) -> bool {
        self.gateway.has_backends().await
    }

    pub fn update_config(&mut self, update: &ConfigUpdate) -> Result<&SessionConfig, ChatError> {
        self.state.config.apply(update)?;
        self.publish();
        self.touch();
        info!("Session config updated: {:?}", self.state.config);
        Ok(&self.state.config)
    }

    /// Drop the conversation history. Configuration is kept.
    pub fn clear(&mut self) {
        self.state.reset();
        self.phase = TurnPhase::Idle;
        self.publish();
        self.touch();
        info!("Conversation cleared");
    }

    /// Answer one question. On any failure the log is left exactly as it was.
    pub async fn ask(&mut self, question: &str) -> Result<TurnOutcome, ChatError> {
        if question.trim().is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        self.touch();

        if !self.gateway.has_backends().await {
            warn!("Rejecting question: no search services available");
            return Err(ChatError::EmptyBackendSet);
        }

        let start = Instant::now();
        let result = self.run_turn(question).await;
        self.set_phase(TurnPhase::Idle);

        match result {
            Ok(outcome) => {
                self.state
                    .log
                    .push_turn(Message::user(question), Message::assistant(&outcome.reply));
                self.publish();
                info!(
                    "Turn completed in {:?} ({} messages in log)",
                    start.elapsed(),
                    self.state.log.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("Turn failed after {:?}: {}", start.elapsed(), e);
                Err(e)
            }
        }
    }

    async fn run_turn(&mut self, question: &str) -> Result<TurnOutcome, ChatError> {
        let config = self.state.config.clone();
        let question = if self.strip_apostrophes {
            question.replace('\'', "")
        } else {
            question.to_string()
        };

        // === HISTORY WINDOW ===
        let history: Vec<Message> = if config.use_chat_history {
            self.state.log.recent(config.num_chat_messages).to_vec()
        } else {
            Vec::new()
        };

        // === REWRITE (only with usable history) ===
        let (search_query, rewritten) = if history.is_empty() {
            (question.clone(), false)
        } else {
            self.set_phase(TurnPhase::AwaitingRewrite);
            let summary = self
                .summarizer
                .summarize(config.model, &history, &question)
                .await?;

            if summary.trim().is_empty() {
                warn!("History summary came back empty, searching with the raw question");
                (question.clone(), false)
            } else {
                (summary, true)
            }
        };

        // === ROUTE + RETRIEVE ===
        self.set_phase(TurnPhase::Retrieving);
        let classification = self.router.classify(&search_query);
        let service = self.routes.service_for(classification).to_string();
        debug!("Query classified as {:?}, using service '{}'", classification, service);

        let context_documents = self
            .gateway
            .retrieve_context(&service, &search_query, config.num_retrieved_chunks)
            .await?;

        // === PROMPT + COMPLETE ===
        let history_text = PromptBuilder::render_history(&history);
        let prompt = PromptBuilder::build(&history_text, &context_documents, &question);

        self.set_phase(TurnPhase::Completing);
        let reply = self.completion.complete(config.model, &prompt).await?;

        let diagnostics = config.debug.then(|| {
            let context = PromptBuilder::render_context(&context_documents);
            debug!("Context documents:\n{}", context);
            TurnDiagnostics {
                search_query,
                rewritten,
                classification,
                service,
                context,
                prompt_tokens: estimate_tokens(&prompt),
            }
        });

        Ok(TurnOutcome { reply, diagnostics })
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            debug!("Turn phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.snapshot.send_modify(|snapshot| snapshot.phase = phase);
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.state.snapshot(self.phase));
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
