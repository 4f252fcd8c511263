//! Local knowledge base — semantic search over the pre-embedded guideline
//! corpus, served by an external search endpoint.
//!
//! Request: `POST {endpoint}` with `{"query": ..., "top_k": n}`.
//! Response: `{"results": [{"source": ..., "content": ..., "score": ...}]}`.

use async_trait::async_trait;
use clinq_config::LocalSourceConfig;
use clinq_core::error::RetrievalError;
use clinq_core::retrieval::{ContextSource, SourceId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_status, http_client, map_send_error};

pub struct LocalKnowledgeSource {
    endpoint: Option<String>,
    top_k: usize,
    client: reqwest::Client,
}

impl LocalKnowledgeSource {
    pub fn new(config: &LocalSourceConfig, timeout: Duration) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            top_k: config.top_k,
            client: http_client(timeout),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Passage>,
}

#[derive(Debug, Deserialize)]
struct Passage {
    #[serde(default)]
    source: String,
    content: String,
    #[serde(default)]
    #[allow(dead_code)]
    score: Option<f32>,
}

fn format_passages(passages: &[Passage]) -> String {
    let body: Vec<String> = passages
        .iter()
        .filter(|p| !p.content.trim().is_empty())
        .map(|p| {
            if p.source.is_empty() {
                p.content.trim().to_string()
            } else {
                format!("[Source: {}]\n{}", p.source, p.content.trim())
            }
        })
        .collect();

    if body.is_empty() {
        return String::new();
    }
    format!("{}\n\n{}", SourceId::Local.header(), body.join("\n\n"))
}

#[async_trait]
impl ContextSource for LocalKnowledgeSource {
    fn id(&self) -> SourceId {
        SourceId::Local
    }

    async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        // No endpoint means the deployment has no local corpus.
        let Some(endpoint) = &self.endpoint else {
            return Ok(String::new());
        };

        let response = self
            .client
            .post(endpoint)
            .json(&SearchRequest {
                query,
                top_k: self.top_k,
            })
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        Ok(format_passages(&parsed.results))
    }
}
