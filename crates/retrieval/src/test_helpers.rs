//! Scripted context source shared by this crate's tests and downstream crates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clinq_core::error::RetrievalError;
use clinq_core::retrieval::{ContextSource, SourceId};

/// Returns the same result on every call and counts invocations.
pub struct ScriptedSource {
    id: SourceId,
    result: Result<String, RetrievalError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn ok(id: SourceId, text: impl Into<String>) -> Self {
        Self {
            id,
            result: Ok(text.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn err(id: SourceId, error: RetrievalError) -> Self {
        Self {
            id,
            result: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextSource for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn search(&self, _query: &str) -> Result<String, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}
