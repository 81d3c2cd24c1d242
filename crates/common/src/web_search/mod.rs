//! Web search adapters
//!
//! Adapters never raise: a search either yields results (possibly none) or a
//! typed `Unavailable` outcome that callers treat as "no results".

use crate::config::WebSearchConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// One web snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub content: String,
    pub url: String,
}

/// Why a search produced nothing usable
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterUnavailable {
    #[error("no API key configured")]
    MissingCredentials,

    #[error("provider failure: {message}")]
    Provider { message: String },
}

/// Outcome of a web search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Provider answered; may be empty
    Results(Vec<WebResult>),
    /// Provider could not be used for this query
    Unavailable(AdapterUnavailable),
}

impl From<AdapterUnavailable> for AppError {
    fn from(err: AdapterUnavailable) -> Self {
        AppError::AdapterUnavailable {
            adapter: "web_search".to_string(),
            message: err.to_string(),
        }
    }
}

/// Web search provider
#[async_trait]
pub trait WebSearchAdapter: Send + Sync {
    /// Search the web, returning at most `max_results` results in relevance order
    async fn search(&self, query: &str, max_results: usize) -> SearchOutcome;

    /// Provider name for logs and readiness checks
    fn provider_name(&self) -> &str;

    /// Whether the adapter has what it needs to issue requests
    fn is_configured(&self) -> bool;
}

/// Tavily search API client
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            endpoint: config.endpoint.clone(),
        })
    }

    async fn request(&self, api_key: &str, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&TavilyRequest {
                api_key,
                query,
                max_results,
                include_answer: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal {
                message: format!("Search API error {}: {}", status, body),
            });
        }

        let payload: TavilyResponse = response.json().await?;

        Ok(payload
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty() && !r.content.trim().is_empty())
            .take(max_results)
            .map(|r| WebResult {
                title: r.title,
                content: r.content,
                url: r.url,
            })
            .collect())
    }
}

#[async_trait]
impl WebSearchAdapter for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> SearchOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return SearchOutcome::Unavailable(AdapterUnavailable::MissingCredentials);
        };

        match self.request(api_key, query, max_results).await {
            Ok(results) => SearchOutcome::Results(results),
            Err(e) => SearchOutcome::Unavailable(AdapterUnavailable::Provider {
                message: e.to_string(),
            }),
        }
    }

    fn provider_name(&self) -> &str {
        "tavily"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Adapter used when web search is switched off
pub struct DisabledSearch;

#[async_trait]
impl WebSearchAdapter for DisabledSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> SearchOutcome {
        SearchOutcome::Unavailable(AdapterUnavailable::MissingCredentials)
    }

    fn provider_name(&self) -> &str {
        "disabled"
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Create a web search adapter based on configuration
pub fn create_web_search(config: &WebSearchConfig) -> Result<Arc<dyn WebSearchAdapter>> {
    match config.provider.as_str() {
        "tavily" => Ok(Arc::new(TavilySearch::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledSearch)),
        other => Err(AppError::Configuration {
            message: format!("Unknown web search provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_typed_outcome() {
        let search = TavilySearch::new(&WebSearchConfig::default()).unwrap();
        assert!(!search.is_configured());

        let outcome = search.search("rust async", 3).await;
        assert_eq!(
            outcome,
            SearchOutcome::Unavailable(AdapterUnavailable::MissingCredentials)
        );
    }

    #[tokio::test]
    async fn test_provider_failure_is_unavailable() {
        let config = WebSearchConfig {
            api_key: Some("tvly-test".to_string()),
            endpoint: "http://127.0.0.1:9/search".to_string(),
            timeout_secs: 1,
            ..WebSearchConfig::default()
        };
        let search = TavilySearch::new(&config).unwrap();

        let outcome = search.search("anything", 3).await;
        assert!(matches!(
            outcome,
            SearchOutcome::Unavailable(AdapterUnavailable::Provider { .. })
        ));
    }

    #[test]
    fn test_factory() {
        let disabled = WebSearchConfig {
            provider: "disabled".to_string(),
            ..WebSearchConfig::default()
        };
        let adapter = create_web_search(&disabled).unwrap();
        assert_eq!(adapter.provider_name(), "disabled");

        let unknown = WebSearchConfig {
            provider: "bing".to_string(),
            ..WebSearchConfig::default()
        };
        assert!(create_web_search(&unknown).is_err());
    }
}
