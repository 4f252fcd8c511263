//! Academic literature — Europe PMC REST search, biased toward UK guidance
//! by OR-ing jurisdiction terms into the query.

use async_trait::async_trait;
use clinq_config::AcademicSourceConfig;
use clinq_core::error::RetrievalError;
use clinq_core::retrieval::{ContextSource, SourceId};
use regex_lite::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

use super::{check_status, http_client, map_send_error, truncate_chars};

static HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

pub struct AcademicLiteratureSource {
    api_url: String,
    bias_terms: Vec<String>,
    max_results: usize,
    abstract_chars: usize,
    client: reqwest::Client,
}

impl AcademicLiteratureSource {
    pub fn new(config: &AcademicSourceConfig, timeout: Duration) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bias_terms: config.bias_terms.clone(),
            max_results: config.max_results,
            abstract_chars: config.abstract_chars,
            client: http_client(timeout),
        }
    }

    fn build_query(&self, query: &str) -> String {
        if self.bias_terms.is_empty() {
            return query.to_string();
        }
        format!("({}) AND ({})", query, self.bias_terms.join(" OR "))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "resultList", default)]
    result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: String,
    #[serde(rename = "journalTitle", default)]
    journal_title: Option<String>,
    #[serde(rename = "journalInfo", default)]
    journal_info: Option<JournalInfo>,
    #[serde(rename = "pubYear", default)]
    pub_year: Option<String>,
    #[serde(rename = "abstractText", default)]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JournalInfo {
    #[serde(default)]
    journal: Option<Journal>,
}

#[derive(Debug, Deserialize)]
struct Journal {
    #[serde(default)]
    title: Option<String>,
}

impl Article {
    fn journal(&self) -> Option<&str> {
        self.journal_title.as_deref().or_else(|| {
            self.journal_info
                .as_ref()
                .and_then(|j| j.journal.as_ref())
                .and_then(|j| j.title.as_deref())
        })
    }
}

fn strip_markup(text: &str) -> String {
    match HTML_TAG.as_ref() {
        Some(re) => re.replace_all(text, " ").split_whitespace().collect::<Vec<_>>().join(" "),
        None => text.to_string(),
    }
}

fn format_articles(articles: &[Article], abstract_chars: usize) -> String {
    let body: Vec<String> = articles
        .iter()
        .filter(|a| !a.title.trim().is_empty())
        .map(|a| {
            let mut entry = format!("Title: {}", strip_markup(&a.title));
            match (a.journal(), a.pub_year.as_deref()) {
                (Some(j), Some(y)) => entry.push_str(&format!("\nJournal: {j} ({y})")),
                (Some(j), None) => entry.push_str(&format!("\nJournal: {j}")),
                (None, Some(y)) => entry.push_str(&format!("\nYear: {y}")),
                (None, None) => {}
            }
            if let Some(abs) = a.abstract_text.as_deref().filter(|t| !t.trim().is_empty()) {
                entry.push_str("\nAbstract: ");
                entry.push_str(&truncate_chars(&strip_markup(abs), abstract_chars));
            }
            entry
        })
        .collect();

    if body.is_empty() {
        return String::new();
    }
    format!("{}\n\n{}", SourceId::Academic.header(), body.join("\n\n"))
}

#[async_trait]
impl ContextSource for AcademicLiteratureSource {
    fn id(&self) -> SourceId {
        SourceId::Academic
    }

    async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        let url = format!("{}/search", self.api_url);
        let full_query = self.build_query(query);
        let page_size = self.max_results.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", full_query.as_str()),
                ("format", "json"),
                ("resultType", "core"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        let articles: Vec<Article> = parsed
            .result_list
            .result
            .into_iter()
            .take(self.max_results)
            .collect();
        Ok(format_articles(&articles, self.abstract_chars))
    }
}
