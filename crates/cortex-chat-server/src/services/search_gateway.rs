use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::utils::error::ChatError;
use crate::utils::retry::{with_retry, RetryPolicy};

/// One search result: field name -> value.
pub type SearchRecord = serde_json::Map<String, Value>;

/// Which field of a search service's results holds retrievable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchServiceDescriptor {
    pub name: String,
    pub search_column: String,
}

/// Trait for the hosted search platform
#[async_trait]
pub trait SearchPlatform: Send + Sync {
    /// Enumerate registered search services and their text field.
    async fn list_services(&self) -> Result<Vec<SearchServiceDescriptor>, ChatError>;

    async fn query(
        &self,
        service: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchRecord>, ChatError>;
}

/// Session-scoped view over the search platform.
///
/// Backend descriptors are discovered lazily on first use and cached for the
/// rest of the session. An empty or failed discovery is not cached, so the
/// next call tries again.
pub struct SearchGateway {
    platform: Arc<dyn SearchPlatform>,
    retry: RetryPolicy,
    descriptors: OnceCell<Vec<SearchServiceDescriptor>>,
}

impl SearchGateway {
    pub fn new(platform: Arc<dyn SearchPlatform>, retry: RetryPolicy) -> Self {
        Self {
            platform,
            retry,
            descriptors: OnceCell::new(),
        }
    }

    /// Discover available backends. Degrades to an empty set on failure.
    pub async fn discover_backends(&self) -> Vec<SearchServiceDescriptor> {
        self.cached_descriptors().await.to_vec()
    }

    /// True once at least one backend has been discovered.
    pub async fn has_backends(&self) -> bool {
        !self.cached_descriptors().await.is_empty()
    }

    async fn cached_descriptors(&self) -> &[SearchServiceDescriptor] {
        let result = self
            .descriptors
            .get_or_try_init(|| async {
                let discovered =
                    with_retry(&self.retry, "search service discovery", || {
                        self.platform.list_services()
                    })
                    .await?;

                let descriptors = dedup_descriptors(discovered);
                if descriptors.is_empty() {
                    return Err(ChatError::EmptyBackendSet);
                }

                info!(
                    "Discovered {} search services: {:?}",
                    descriptors.len(),
                    descriptors.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
                );
                Ok(descriptors)
            })
            .await;

        match result {
            Ok(descriptors) => descriptors.as_slice(),
            Err(ChatError::EmptyBackendSet) => {
                warn!("No search services registered, querying disabled");
                &[]
            }
            Err(e) => {
                warn!("Search service discovery failed, querying disabled: {}", e);
                &[]
            }
        }
    }

    async fn resolve(&self, backend: &str) -> Result<SearchServiceDescriptor, ChatError> {
        self.cached_descriptors()
            .await
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(backend))
            .cloned()
            .ok_or_else(|| ChatError::backend_not_found(backend))
    }

    /// Query a discovered backend. Never returns more than `max_results` records.
    pub async fn search(
        &self,
        backend: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchRecord>, ChatError> {
        let descriptor = self.resolve(backend).await?;

        let mut records = with_retry(&self.retry, "search", || {
            self.platform.query(&descriptor.name, query, max_results)
        })
        .await?;

        records.truncate(max_results);
        Ok(records)
    }

    /// Search and project each record onto the backend's text field.
    pub async fn retrieve_context(
        &self,
        backend: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, ChatError> {
        let descriptor = self.resolve(backend).await?;
        let records = self.search(&descriptor.name, query, max_results).await?;

        let snippets: Vec<String> = records
            .iter()
            .filter_map(|record| snippet_text(record, &descriptor.search_column))
            .collect();

        if snippets.len() < records.len() {
            warn!(
                "{} of {} records from '{}' lacked field '{}'",
                records.len() - snippets.len(),
                records.len(),
                descriptor.name,
                descriptor.search_column
            );
        }

        debug!("Retrieved {} context snippets from '{}'", snippets.len(), descriptor.name);
        Ok(snippets)
    }
}

/// At most one descriptor per distinct service name (case-insensitive, first wins).
fn dedup_descriptors(discovered: Vec<SearchServiceDescriptor>) -> Vec<SearchServiceDescriptor> {
    let mut unique: Vec<SearchServiceDescriptor> = Vec::with_capacity(discovered.len());
    for descriptor in discovered {
        if !unique.iter().any(|d| d.name.eq_ignore_ascii_case(&descriptor.name)) {
            unique.push(descriptor);
        }
    }
    unique
}

fn snippet_text(record: &SearchRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory platform with scripted discovery and canned records.
    pub(crate) struct FakePlatform {
        pub descriptors: Mutex<Vec<SearchServiceDescriptor>>,
        pub records: Vec<SearchRecord>,
        pub discovery_failures: AtomicUsize,
        pub query_failures: AtomicUsize,
        pub list_calls: AtomicUsize,
        pub queries: Mutex<Vec<(String, String, usize)>>,
    }

    impl FakePlatform {
        pub(crate) fn new(descriptors: Vec<SearchServiceDescriptor>, records: Vec<SearchRecord>) -> Self {
            Self {
                descriptors: Mutex::new(descriptors),
                records,
                discovery_failures: AtomicUsize::new(0),
                query_failures: AtomicUsize::new(0),
                list_calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_default_services(records: Vec<SearchRecord>) -> Self {
            Self::new(
                vec![
                    descriptor("stock_market_service", "SECURITY_NAME"),
                    descriptor("prospectus_service", "CHUNK"),
                ],
                records,
            )
        }
    }

    #[async_trait]
    impl SearchPlatform for FakePlatform {
        async fn list_services(&self) -> Result<Vec<SearchServiceDescriptor>, ChatError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.discovery_failures.load(Ordering::SeqCst) > 0 {
                self.discovery_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ChatError::BackendUnavailable("platform unreachable".into()));
            }
            Ok(self.descriptors.lock().unwrap().clone())
        }

        async fn query(
            &self,
            service: &str,
            query: &str,
            limit: usize,
        ) -> Result<Vec<SearchRecord>, ChatError> {
            self.queries
                .lock()
                .unwrap()
                .push((service.to_string(), query.to_string(), limit));
            if self.query_failures.load(Ordering::SeqCst) > 0 {
                self.query_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ChatError::BackendUnavailable("timeout".into()));
            }
            // ignores `limit` on purpose so the gateway's truncation is exercised
            Ok(self.records.clone())
        }
    }

    pub(crate) fn descriptor(name: &str, column: &str) -> SearchServiceDescriptor {
        SearchServiceDescriptor {
            name: name.to_string(),
            search_column: column.to_string(),
        }
    }

    pub(crate) fn record(value: Value) -> SearchRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be a JSON object"),
        }
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        }
    }

    fn chunks(n: usize) -> Vec<SearchRecord> {
        (1..=n)
            .map(|i| record(json!({"CHUNK": format!("chunk {}", i)})))
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_backend_is_configuration_error() {
        let platform = Arc::new(FakePlatform::with_default_services(chunks(3)));
        let gateway = SearchGateway::new(platform.clone(), no_wait());

        let err = gateway.search("missing_service", "q", 5).await.unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert!(err.to_string().contains("backend not found"));
        // no network call for an unknown backend
        assert!(platform.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_truncated_to_max() {
        let platform = Arc::new(FakePlatform::with_default_services(chunks(8)));
        let gateway = SearchGateway::new(platform, no_wait());

        for max in 1..=10 {
            let snippets = gateway
                .retrieve_context("prospectus_service", "risk", max)
                .await
                .unwrap();
            assert!(snippets.len() <= max);
        }
    }

    #[tokio::test]
    async fn test_backend_lookup_is_case_insensitive() {
        let platform = Arc::new(FakePlatform::with_default_services(chunks(2)));
        let gateway = SearchGateway::new(platform.clone(), no_wait());

        let snippets = gateway
            .retrieve_context("PROSPECTUS_SERVICE", "risk", 5)
            .await
            .unwrap();
        assert_eq!(snippets, vec!["chunk 1", "chunk 2"]);
        assert_eq!(platform.queries.lock().unwrap()[0].0, "prospectus_service");
    }

    #[tokio::test]
    async fn test_snippets_use_search_column_and_skip_missing() {
        let records = vec![
            record(json!({"SECURITY_NAME": "Apple Inc.", "SYMBOL": "AAPL"})),
            record(json!({"SYMBOL": "MSFT"})),
            record(json!({"SECURITY_NAME": null})),
            record(json!({"SECURITY_NAME": 42})),
        ];
        let platform = Arc::new(FakePlatform::with_default_services(records));
        let gateway = SearchGateway::new(platform, no_wait());

        let snippets = gateway
            .retrieve_context("stock_market_service", "symbol", 5)
            .await
            .unwrap();
        assert_eq!(snippets, vec!["Apple Inc.", "42"]);
    }

    #[tokio::test]
    async fn test_discovery_is_cached() {
        let platform = Arc::new(FakePlatform::with_default_services(Vec::new()));
        let gateway = SearchGateway::new(platform.clone(), no_wait());

        assert_eq!(gateway.discover_backends().await.len(), 2);
        assert_eq!(gateway.discover_backends().await.len(), 2);
        assert!(gateway.has_backends().await);
        assert_eq!(platform.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_degrades_to_empty_then_recovers() {
        let platform = Arc::new(FakePlatform::with_default_services(Vec::new()));
        platform.discovery_failures.store(3, Ordering::SeqCst);
        let gateway = SearchGateway::new(platform.clone(), no_wait());

        // three attempts, all failing
        assert!(gateway.discover_backends().await.is_empty());
        assert_eq!(platform.list_calls.load(Ordering::SeqCst), 3);

        assert!(gateway.has_backends().await);
        assert_eq!(platform.list_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_empty_backend_set_is_not_cached() {
        let platform = Arc::new(FakePlatform::new(Vec::new(), Vec::new()));
        let gateway = SearchGateway::new(platform.clone(), no_wait());

        assert!(!gateway.has_backends().await);
        platform
            .descriptors
            .lock()
            .unwrap()
            .push(descriptor("prospectus_service", "CHUNK"));
        assert!(gateway.has_backends().await);
    }

    #[tokio::test]
    async fn test_duplicate_descriptors_collapse() {
        let platform = Arc::new(FakePlatform::new(
            vec![
                descriptor("prospectus_service", "CHUNK"),
                descriptor("Prospectus_Service", "OTHER"),
            ],
            Vec::new(),
        ));
        let gateway = SearchGateway::new(platform, no_wait());

        let descriptors = gateway.discover_backends().await;
        assert_eq!(descriptors, vec![descriptor("prospectus_service", "CHUNK")]);
    }

    #[tokio::test]
    async fn test_transient_search_failures_are_retried() {
        let platform = Arc::new(FakePlatform::with_default_services(chunks(1)));
        platform.query_failures.store(2, Ordering::SeqCst);
        let gateway = SearchGateway::new(platform.clone(), no_wait());

        let snippets = gateway
            .retrieve_context("prospectus_service", "q", 5)
            .await
            .unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(platform.queries.lock().unwrap().len(), 3);
    }
}
