//! Multi-source retrieval for clinq.
//!
//! A question is sanitized, then fanned out to three independent sources
//! (local knowledge base, academic literature, trusted web). Each source is
//! wrapped in an adapter that turns every failure into an empty fragment;
//! the web source is additionally guarded by a one-way circuit breaker.

pub mod adapter;
pub mod breaker;
pub mod coordinator;
pub mod sanitizer;
pub mod sources;

pub use adapter::SourceAdapter;
pub use breaker::{BreakerState, CircuitBreaker};
pub use coordinator::RetrievalCoordinator;
pub use sanitizer::sanitize_query;

#[cfg(test)]
pub(crate) mod test_helpers;
