use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PlatformConfig;
use crate::models::chat::ModelId;
use crate::services::conversation::controller::CompletionService;
use crate::services::search_gateway::{SearchPlatform, SearchRecord, SearchServiceDescriptor};
use crate::utils::error::ChatError;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct SearchQueryRequest<'a> {
    query: &'a str,
    columns: Vec<String>,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchQueryResponse {
    #[serde(default)]
    results: Vec<SearchRecord>,
}

#[derive(Debug, Deserialize)]
struct ServiceSummary {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceDescription {
    name: String,
    #[serde(default)]
    search_column: Option<String>,
}

/// REST client for the hosted search + completion platform.
///
/// Constructed once at startup and shared by every session. Authentication
/// is a pre-issued bearer token; acquiring it is the operator's concern.
#[derive(Clone)]
pub struct CortexClient {
    client: Client,
    config: PlatformConfig,
}

impl CortexClient {
    pub fn new(config: PlatformConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| ChatError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn services_url(&self) -> String {
        format!(
            "{}/api/v2/databases/{}/schemas/{}/cortex-search-services",
            self.base_url(),
            self.config.database,
            self.config.schema
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.token)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ChatError> {
        let response = self.authorized(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        Ok(response.json::<T>().await?)
    }

    async fn describe_service(&self, name: &str) -> Result<ServiceDescription, ChatError> {
        let url = format!("{}/{}", self.services_url(), name);
        self.send_json(self.client.get(&url)).await
    }
}

/// Throttling and server faults are transient; other rejections are logical.
fn classify_status(status: StatusCode, body: String) -> ChatError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ChatError::BackendUnavailable(format!("platform returned {}: {}", status, body))
    } else {
        ChatError::PlatformRejected {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl SearchPlatform for CortexClient {
    async fn list_services(&self) -> Result<Vec<SearchServiceDescriptor>, ChatError> {
        let summaries: Vec<ServiceSummary> =
            self.send_json(self.client.get(self.services_url())).await?;
        debug!("Platform reported {} search services", summaries.len());

        let mut descriptors = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let description = match self.describe_service(&summary.name).await {
                Ok(description) => description,
                // transient failures fail the whole discovery so it gets retried
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!("Cannot describe search service '{}', skipping: {}", summary.name, e);
                    continue;
                }
            };
            match description.search_column {
                Some(search_column) if !search_column.is_empty() => {
                    descriptors.push(SearchServiceDescriptor {
                        name: description.name,
                        search_column,
                    });
                }
                _ => warn!(
                    "Search service '{}' has no search column, skipping",
                    summary.name
                ),
            }
        }

        Ok(descriptors)
    }

    async fn query(
        &self,
        service: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchRecord>, ChatError> {
        let url = format!("{}/{}:query", self.services_url(), service);
        let request = SearchQueryRequest {
            query,
            columns: Vec::new(),
            limit,
        };

        let response: SearchQueryResponse =
            self.send_json(self.client.post(&url).json(&request)).await?;
        debug!("Service '{}' returned {} records", service, response.results.len());
        Ok(response.results)
    }
}

#[async_trait]
impl CompletionService for CortexClient {
    async fn complete(&self, model: ModelId, prompt: &str) -> Result<String, ChatError> {
        debug!("Requesting completion from {} ({} chars)", model, prompt.len());

        let url = format!("{}/api/v2/cortex/inference:complete", self.base_url());
        let request = CompletionRequest {
            model: model.as_str(),
            messages: vec![CompletionMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response: CompletionResponse =
            self.send_json(self.client.post(&url).json(&request)).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("No choices returned from completion".to_string()))
    }
}
