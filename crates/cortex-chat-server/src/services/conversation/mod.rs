//! Conversation management module
//!
//! Per-session state, the turn pipeline driving it, and the registry that
//! keeps sessions apart.

pub mod controller;
pub mod registry;
pub mod types;

pub use controller::{
    CompletionService, ConversationController, ServiceRoutes, TurnDiagnostics, TurnOutcome,
};
pub use registry::{ControllerFactory, SessionEntry, SessionRegistry, SharedController};
pub use types::{ConversationLog, SessionConfig, SessionSnapshot, SessionState, TurnPhase};
