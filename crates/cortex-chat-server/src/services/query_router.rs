//! Query Router
//! Decides which search backend is topically appropriate for a question:
//! the structured (tabular metadata) index or the unstructured (document) index.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Questions about fields of the tabular dataset
    /// Examples: "What is the symbol for Apple?", "Is QQQ an ETF?"
    Structured,

    /// Everything else goes to the document index
    /// Examples: "Summarize the risk factors section"
    Unstructured,
}

/// Pluggable topic routing strategy.
pub trait TopicRouter: Send + Sync {
    fn classify(&self, query: &str) -> Classification;
}

/// Case-insensitive substring match against a fixed keyword list.
/// First match wins; no match routes to the unstructured index.
#[derive(Debug, Clone)]
pub struct KeywordRouter {
    keywords: Vec<String>,
}

impl KeywordRouter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl TopicRouter for KeywordRouter {
    fn classify(&self, query: &str) -> Classification {
        let query_lower = query.to_lowercase();

        for keyword in &self.keywords {
            if query_lower.contains(keyword.as_str()) {
                debug!("Routing to structured index: matched '{}'", keyword);
                return Classification::Structured;
            }
        }

        debug!("No structured keyword matched, routing to unstructured index");
        Classification::Unstructured
    }
}
