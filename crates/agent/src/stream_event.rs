//! Stream completion events.
//!
//! When an answer stream ends, exactly one `StreamOutcome` is emitted on a
//! side channel. Background work subscribes to that event instead of running
//! "after" the stream in the request's control flow. A stream dropped by a
//! disconnected client emits nothing.

use clinq_core::error::ProviderError;
use clinq_core::provider::Usage;

#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// The model finished and every chunk was handed to the client.
    Completed {
        answer: String,
        usage: Option<Usage>,
    },

    /// The provider failed after streaming began. `partial` is what the
    /// client received before the inline warning.
    Interrupted {
        partial: String,
        error: ProviderError,
    },
}

impl StreamOutcome {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Interrupted { .. } => "interrupted",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
