//! LLM provider implementations for clinq.
//!
//! All providers implement the `clinq_core::Provider` trait.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderSet, build_from_config};
