use serde::Serialize;
use validator::Validate;

use crate::config::SessionDefaults;
use crate::models::chat::{ConfigUpdate, Message, ModelId, Role};
use crate::utils::error::ChatError;

/// User-facing knobs read by every pipeline stage. Clearing the
/// conversation never touches these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub model: ModelId,
    pub num_retrieved_chunks: usize,
    pub num_chat_messages: usize,
    pub use_chat_history: bool,
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&SessionDefaults::default())
    }
}

impl From<&SessionDefaults> for SessionConfig {
    fn from(defaults: &SessionDefaults) -> Self {
        Self {
            model: defaults.default_model,
            num_retrieved_chunks: defaults.num_retrieved_chunks,
            num_chat_messages: defaults.num_chat_messages,
            use_chat_history: defaults.use_chat_history,
            debug: defaults.debug,
        }
    }
}

impl SessionConfig {
    /// Apply a partial update; nothing changes if validation fails.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<(), ChatError> {
        update
            .validate()
            .map_err(|e| ChatError::InvalidConfig(e.to_string()))?;

        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(n) = update.num_retrieved_chunks {
            self.num_retrieved_chunks = n;
        }
        if let Some(n) = update.num_chat_messages {
            self.num_chat_messages = n;
        }
        if let Some(flag) = update.use_chat_history {
            self.use_chat_history = flag;
        }
        if let Some(flag) = update.debug {
            self.debug = flag;
        }
        Ok(())
    }
}

/// Append-only message log for one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed turn. Both messages go in together so a failed
    /// turn never leaves a dangling question.
    pub fn push_turn(&mut self, question: Message, reply: Message) {
        debug_assert_eq!(question.role(), Role::User);
        debug_assert_eq!(reply.role(), Role::Assistant);
        self.messages.push(question);
        self.messages.push(reply);
    }

    /// The `n` most recent messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Where a session's turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    AwaitingRewrite,
    Retrieving,
    Completing,
}

/// Last published view of a session, readable while a turn holds the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: TurnPhase,
    pub config: SessionConfig,
    pub messages: Vec<Message>,
}

/// Everything one session owns: its configuration and its message log.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub config: SessionConfig,
    pub log: ConversationLog,
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            log: ConversationLog::new(),
        }
    }

    /// Empty the log, keep the configuration.
    pub fn reset(&mut self) {
        self.log.clear();
    }

    pub fn snapshot(&self, phase: TurnPhase) -> SessionSnapshot {
        SessionSnapshot {
            phase,
            config: self.config.clone(),
            messages: self.log.messages().to_vec(),
        }
    }
}
