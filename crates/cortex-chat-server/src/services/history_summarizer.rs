use std::sync::Arc;

use tracing::debug;

use crate::models::chat::{Message, ModelId};
use crate::services::conversation::controller::CompletionService;
use crate::services::prompt_builder::{neutralize_tags, PromptBuilder};
use crate::utils::error::ChatError;

/// Rewrites a follow-up question into a self-contained search query using
/// the recent chat history. One completion call per invocation, no caching.
pub struct HistorySummarizer {
    completion: Arc<dyn CompletionService>,
}

impl HistorySummarizer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    pub fn build_prompt(history: &[Message], question: &str) -> String {
        format!(
            "[INST]\n\
             Based on the chat history below and the question, generate a query that extend the question\n\
             with the chat history provided. The query should be in natural language.\n\
             Answer with only the query. Do not add any explanation.\n\n\
             <chat_history>\n{}\n</chat_history>\n\
             <question>\n{}\n</question>\n\
             [/INST]\n",
            neutralize_tags(&PromptBuilder::render_history(history)),
            neutralize_tags(question),
        )
    }

    /// Returns the raw completion as the rewritten query.
    pub async fn summarize(
        &self,
        model: ModelId,
        history: &[Message],
        question: &str,
    ) -> Result<String, ChatError> {
        debug!("Summarizing {} history messages into a search query", history.len());

        let prompt = Self::build_prompt(history, question);
        let summary = self.completion.complete(model, &prompt).await?;

        debug!("Rewritten query: {}", summary);
        Ok(summary)
    }
}
