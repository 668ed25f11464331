pub mod conversation;
pub mod cortex_client;
pub mod history_summarizer;
pub mod prompt_builder;
pub mod query_router;
pub mod search_gateway;

pub use cortex_client::CortexClient;
pub use history_summarizer::HistorySummarizer;
pub use prompt_builder::PromptBuilder;
pub use query_router::{Classification, KeywordRouter, TopicRouter};
pub use search_gateway::{SearchGateway, SearchPlatform, SearchServiceDescriptor};
