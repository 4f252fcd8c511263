//! Retrieval coordinator — concurrent fan-out over the three sources with an
//! all-settle join.
//!
//! Each adapter bounds its own latency and never fails, so the join always
//! completes with a full `(local, academic, web)` triple.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clinq_config::RetrievalConfig;
use clinq_core::retrieval::{ContextSource, RetrievedContext};
use tracing::info;

use crate::adapter::SourceAdapter;
use crate::breaker::CircuitBreaker;
use crate::sources::{AcademicLiteratureSource, LocalKnowledgeSource, TrustedWebSource};

pub struct RetrievalCoordinator {
    local: SourceAdapter,
    academic: SourceAdapter,
    web: SourceAdapter,
}

impl RetrievalCoordinator {
    pub fn new(local: SourceAdapter, academic: SourceAdapter, web: SourceAdapter) -> Self {
        Self {
            local,
            academic,
            web,
        }
    }

    /// Wire the real sources from configuration. The web source is guarded by
    /// `web_breaker`, which the caller owns so it can be shared and reported.
    pub fn from_config(config: &RetrievalConfig, web_breaker: Arc<CircuitBreaker>) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);

        let local: Arc<dyn ContextSource> = Arc::new(LocalKnowledgeSource::new(&config.local, timeout));
        let academic: Arc<dyn ContextSource> =
            Arc::new(AcademicLiteratureSource::new(&config.academic, timeout));
        let web: Arc<dyn ContextSource> = Arc::new(TrustedWebSource::new(&config.web, timeout));

        Self::new(
            SourceAdapter::new(local, timeout),
            SourceAdapter::new(academic, timeout),
            SourceAdapter::new(web, timeout).with_breaker(web_breaker),
        )
    }

    /// Query all sources concurrently and wait for every one to settle.
    ///
    /// `query` must already be sanitized.
    pub async fn retrieve(&self, query: &str) -> RetrievedContext {
        let started = Instant::now();

        let (local, academic, web) = tokio::join!(
            self.local.fetch_context(query),
            self.academic.fetch_context(query),
            self.web.fetch_context(query),
        );

        let context = RetrievedContext {
            local,
            academic,
            web,
        };

        info!(
            sources = ?context.contributing_sources(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieval complete"
        );

        context
    }

    /// The breaker guarding the web source, if any.
    pub fn web_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.web.breaker()
    }
}
