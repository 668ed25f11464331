use anyhow::Result;
use config::{Config, Environment, File, FileFormat, FileSourceFile};
use serde::{Deserialize, Serialize};

use crate::models::chat::ModelId;
use crate::utils::retry::RetryPolicy;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    pub retry: RetryPolicy,
    pub routing: RoutingConfig,
    pub session: SessionDefaults,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Connection details for the hosted search/completion platform.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlatformConfig {
    pub base_url: String,
    /// Opaque pre-issued bearer token.
    pub token: String,
    pub database: String,
    pub schema: String,
    pub timeout_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            token: String::new(),
            database: "CORTEX_SEARCH_DB".to_string(),
            schema: "PUBLIC".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoutingConfig {
    pub structured_service: String,
    pub unstructured_service: String,
    pub structured_keywords: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            structured_service: "stock_market_service".to_string(),
            unstructured_service: "prospectus_service".to_string(),
            structured_keywords: [
                "nasdaq traded",
                "symbol",
                "security name",
                "listing exchange",
                "market category",
                "etf",
                "round lot size",
                "test issue",
                "financial status",
                "cqs symbol",
                "nasdaq symbol",
                "nextshares",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        }
    }
}

/// Starting values for every new session's configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionDefaults {
    pub default_model: ModelId,
    pub num_retrieved_chunks: usize,
    pub num_chat_messages: usize,
    pub use_chat_history: bool,
    pub debug: bool,
    pub strip_apostrophes: bool,
    pub idle_timeout_seconds: u64,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            default_model: ModelId::MistralLarge,
            num_retrieved_chunks: 5,
            num_chat_messages: 5,
            use_chat_history: true,
            debug: false,
            strip_apostrophes: true,
            idle_timeout_seconds: 3600,
        }
    }
}

/// `APP__SECTION__KEY` overrides. The keyword list takes a comma-separated value.
fn environment() -> Environment {
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("routing.structured_keywords")
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_sources(File::with_name("config/settings").required(false), environment())
    }

    fn from_sources(file: File<FileSourceFile, FileFormat>, env: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(env)
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let session = &self.session;
        if !(1..=10).contains(&session.num_retrieved_chunks) {
            anyhow::bail!("session.num_retrieved_chunks must be within 1..=10");
        }
        if !(1..=10).contains(&session.num_chat_messages) {
            anyhow::bail!("session.num_chat_messages must be within 1..=10");
        }
        if self.routing.structured_service.trim().is_empty()
            || self.routing.unstructured_service.trim().is_empty()
        {
            anyhow::bail!("routing service names must not be empty");
        }
        if session.idle_timeout_seconds == 0 {
            anyhow::bail!("session.idle_timeout_seconds must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_interactive_surface() {
        let settings = Settings::default();
        assert_eq!(settings.session.default_model, ModelId::MistralLarge);
        assert_eq!(settings.session.num_retrieved_chunks, 5);
        assert_eq!(settings.session.num_chat_messages, 5);
        assert!(settings.session.use_chat_history);
        assert!(!settings.session.debug);
        assert_eq!(settings.routing.structured_keywords.len(), 12);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_window() {
        let mut settings = Settings::default();
        settings.session.num_chat_messages = 11;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.session.num_retrieved_chunks = 0;
        assert!(settings.validate().is_err());
    }

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<std::collections::HashMap<_, _>>();
        environment().source(Some(map))
    }

    fn no_file() -> File<FileSourceFile, FileFormat> {
        File::with_name("config/does-not-exist").required(false)
    }

    #[test]
    fn test_env_overrides_keyword_list() {
        let settings = Settings::from_sources(
            no_file(),
            env_with(&[
                ("APP__ROUTING__STRUCTURED_KEYWORDS", "ticker,isin,cusip"),
                ("APP__SESSION__NUM_CHAT_MESSAGES", "3"),
            ]),
        )
        .unwrap();

        assert_eq!(
            settings.routing.structured_keywords,
            vec!["ticker".to_string(), "isin".to_string(), "cusip".to_string()]
        );
        assert_eq!(settings.session.num_chat_messages, 3);
        assert_eq!(settings.routing.structured_service, "stock_market_service");
    }

    #[test]
    fn test_env_override_is_validated() {
        let result = Settings::from_sources(
            no_file(),
            env_with(&[("APP__SESSION__NUM_RETRIEVED_CHUNKS", "42")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_round_trip_through_config_builder() {
        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default()).unwrap())
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.routing.unstructured_service, "prospectus_service");
        assert_eq!(settings.platform.timeout_seconds, 60);
    }
}
