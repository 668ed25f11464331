use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::services::conversation::types::{SessionConfig, TurnPhase};
use crate::services::conversation::TurnDiagnostics;

pub type SessionId = Uuid;

/// Who authored a message in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Models accepted by the completion service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[default]
    #[serde(rename = "mistral-large")]
    MistralLarge,
    #[serde(rename = "llama3-70b")]
    Llama3_70b,
    #[serde(rename = "llama3-8b")]
    Llama3_8b,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [Self::MistralLarge, Self::Llama3_70b, Self::Llama3_8b];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MistralLarge => "mistral-large",
            Self::Llama3_70b => "llama3-70b",
            Self::Llama3_8b => "llama3-8b",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Partial update of a session's configuration. Absent fields keep their value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub model: Option<ModelId>,
    #[serde(default)]
    #[validate(range(min = 1, max = 10))]
    pub num_retrieved_chunks: Option<usize>,
    #[serde(default)]
    #[validate(range(min = 1, max = 10))]
    pub num_chat_messages: Option<usize>,
    #[serde(default)]
    pub use_chat_history: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub config: SessionConfig,
    pub input_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub messages: Vec<Message>,
    pub config: SessionConfig,
    pub phase: TurnPhase,
    pub created_at: DateTime<Utc>,
    /// False while a turn is running or no search services are available.
    pub input_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub session_id: SessionId,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<TurnDiagnostics>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelId>,
    pub default_model: ModelId,
}
