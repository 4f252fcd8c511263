//! Trusted web search — Tavily search restricted to an allow-list of
//! clinical guidance domains.
//!
//! The allow-list is applied twice: as `site:` clauses in the query text and
//! as the API's `include_domains` filter. Results are text only and capped
//! at three.

use async_trait::async_trait;
use clinq_config::WebSourceConfig;
use clinq_core::error::RetrievalError;
use clinq_core::retrieval::{ContextSource, SourceId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_status, http_client, map_send_error};

/// Hard ceiling on results per call regardless of configuration.
pub const MAX_WEB_RESULTS: usize = 3;

pub struct TrustedWebSource {
    api_key: Option<String>,
    api_url: String,
    trusted_domains: Vec<String>,
    max_results: usize,
    client: reqwest::Client,
}

impl TrustedWebSource {
    pub fn new(config: &WebSourceConfig, timeout: Duration) -> Self {
        Self {
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            trusted_domains: config.trusted_domains.clone(),
            max_results: config.max_results.clamp(1, MAX_WEB_RESULTS),
            client: http_client(timeout),
        }
    }

    fn augment_query(&self, query: &str) -> String {
        if self.trusted_domains.is_empty() {
            return query.to_string();
        }
        let sites: Vec<String> = self
            .trusted_domains
            .iter()
            .map(|d| format!("site:{d}"))
            .collect();
        format!("{} ({})", query, sites.join(" OR "))
    }

    fn request_body<'a>(&'a self, api_key: &'a str, query: &'a str) -> SearchRequest<'a> {
        SearchRequest {
            api_key,
            query: self.augment_query(query),
            include_domains: &self.trusted_domains,
            max_results: self.max_results,
            include_images: false,
            include_answer: false,
            search_depth: "basic",
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: String,
    include_domains: &'a [String],
    max_results: usize,
    include_images: bool,
    include_answer: bool,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

// URLs are deliberately left out: this context is used but never cited.
fn format_results(results: &[WebResult], limit: usize) -> String {
    let body: Vec<String> = results
        .iter()
        .filter(|r| !r.content.trim().is_empty())
        .take(limit)
        .map(|r| {
            if r.title.trim().is_empty() {
                r.content.trim().to_string()
            } else {
                format!("{}\n{}", r.title.trim(), r.content.trim())
            }
        })
        .collect();

    if body.is_empty() {
        return String::new();
    }
    format!("{}\n\n{}", SourceId::Web.header(), body.join("\n\n"))
}

#[async_trait]
impl ContextSource for TrustedWebSource {
    fn id(&self) -> SourceId {
        SourceId::Web
    }

    async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        let Some(api_key) = &self.api_key else {
            return Err(RetrievalError::NotConfigured("TAVILY_API_KEY is not set".into()));
        };

        let url = format!("{}/search", self.api_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(api_key, query))
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        Ok(format_results(&parsed.results, self.max_results))
    }
}
