//! Source adapter — turns a fallible `ContextSource` into a fragment that is
//! always produced.
//!
//! Every failure mode (error, timeout, empty result) collapses into an empty
//! fragment plus a log line. When a breaker is attached, the first source
//! error opens it and every later call returns empty without touching the
//! source.

use std::sync::Arc;
use std::time::Duration;

use clinq_core::retrieval::{ContextSource, RetrievalFragment, SourceId};
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;

pub struct SourceAdapter {
    source: Arc<dyn ContextSource>,
    breaker: Option<Arc<CircuitBreaker>>,
    timeout: Duration,
}

impl SourceAdapter {
    pub fn new(source: Arc<dyn ContextSource>, timeout: Duration) -> Self {
        Self {
            source,
            breaker: None,
            timeout,
        }
    }

    /// Guard this adapter with `breaker`.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn id(&self) -> SourceId {
        self.source.id()
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Fetch context for `query`. Never fails.
    pub async fn fetch_context(&self, query: &str) -> RetrievalFragment {
        let id = self.source.id();

        if self.breaker.as_ref().is_some_and(|b| b.is_open()) {
            debug!(source = %id, "Circuit open, skipping source");
            return RetrievalFragment::empty(id);
        }

        match tokio::time::timeout(self.timeout, self.source.search(query)).await {
            Ok(Ok(text)) => {
                let fragment = RetrievalFragment::new(id, text);
                if !fragment.is_present() {
                    debug!(source = %id, "Source returned no results");
                    return RetrievalFragment::empty(id);
                }
                debug!(source = %id, chars = fragment.text.len(), "Source returned context");
                fragment
            }
            Ok(Err(e)) => {
                warn!(source = %id, error = %e, "Source failed, continuing without it");
                if let Some(breaker) = &self.breaker {
                    if breaker.trip() {
                        warn!(source = %id, "Circuit breaker opened for the rest of this process");
                    }
                }
                RetrievalFragment::empty(id)
            }
            Err(_) => {
                warn!(
                    source = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Source timed out, continuing without it"
                );
                RetrievalFragment::empty(id)
            }
        }
    }
}
