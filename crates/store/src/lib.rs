//! Storage backends for clinq's external collaborators.
//!
//! Backends implement `HistoryStore`, `ProfileStore`, and `AnalyticsSink`
//! from `clinq_core::store`.

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
