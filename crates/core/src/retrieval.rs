//! Retrieval domain — context sources and the fragments they produce.
//!
//! Three independent sources contribute context to every answer. Each one
//! produces at most one fragment per request; fragments are consumed by the
//! assembler and never persisted.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies which source produced a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Pre-embedded local guideline corpus
    Local,
    /// Public academic literature search
    Academic,
    /// Web search restricted to trusted domains
    Web,
}

impl SourceId {
    /// All sources in assembly precedence order.
    pub const ALL: [SourceId; 3] = [SourceId::Local, SourceId::Academic, SourceId::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Academic => "academic",
            Self::Web => "web",
        }
    }

    /// Human-readable label used in fragment headers and the citation policy.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local => "Local Knowledge Base",
            Self::Academic => "Academic Literature",
            Self::Web => "Trusted Web Sources",
        }
    }

    /// The header line that opens every fragment from this source.
    pub fn header(&self) -> String {
        format!("=== {} ===", self.label())
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source-labelled block of retrieved text for one request.
///
/// An empty `text` is the canonical "nothing useful found" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalFragment {
    pub source: SourceId,
    pub text: String,
}

impl RetrievalFragment {
    pub fn new(source: SourceId, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }

    pub fn empty(source: SourceId) -> Self {
        Self {
            source,
            text: String::new(),
        }
    }

    /// Whether this fragment carries any usable context.
    pub fn is_present(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// The ordered `(local, academic, web)` triple returned by the coordinator.
///
/// Any or all fragments may be empty; an all-empty context is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedContext {
    pub local: RetrievalFragment,
    pub academic: RetrievalFragment,
    pub web: RetrievalFragment,
}

impl RetrievedContext {
    pub fn empty() -> Self {
        Self {
            local: RetrievalFragment::empty(SourceId::Local),
            academic: RetrievalFragment::empty(SourceId::Academic),
            web: RetrievalFragment::empty(SourceId::Web),
        }
    }

    /// Fragments in fixed precedence order: local, academic, web.
    pub fn fragments(&self) -> [&RetrievalFragment; 3] {
        [&self.local, &self.academic, &self.web]
    }

    /// Sources that contributed non-empty context.
    pub fn contributing_sources(&self) -> Vec<SourceId> {
        self.fragments()
            .iter()
            .filter(|f| f.is_present())
            .map(|f| f.source)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.contributing_sources().is_empty()
    }
}

/// A single external retrieval capability.
///
/// Implementations report failures honestly through `Err`; converting those
/// into empty fragments is the adapter layer's job, not the source's.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Which fragment slot this source fills.
    fn id(&self) -> SourceId;

    /// Search for `query` and return a formatted fragment (header + passages),
    /// or an empty string when nothing relevant was found.
    async fn search(&self, query: &str) -> std::result::Result<String, RetrievalError>;
}
