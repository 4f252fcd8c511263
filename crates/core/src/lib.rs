//! # clinq Core
//!
//! Domain types, traits, and error definitions for the clinq clinical
//! question answering service. This crate has **no framework dependencies**:
//! it defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in
//! their own crates. This enables:
//! - Swapping a search API or model provider via configuration
//! - Testing the pipeline with scripted mocks
//! - A clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use retrieval::{ContextSource, RetrievalFragment, RetrievedContext, SourceId};
pub use store::{AnalyticsEvent, AnalyticsSink, ConversationTurn, HistoryStore, Profile, ProfileStore};
