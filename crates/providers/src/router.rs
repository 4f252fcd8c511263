//! Provider wiring — builds the answering and consolidation models from config.

use std::sync::Arc;

use clinq_config::{AppConfig, ModelConfig};
use clinq_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// The two models a turn uses.
#[derive(Clone)]
pub struct ProviderSet {
    /// Streams the visible answer.
    pub answer: Arc<dyn Provider>,
    pub answer_model: String,
    pub answer_max_tokens: u32,

    /// Small non-streaming model for memory consolidation.
    pub consolidation: Arc<dyn Provider>,
    pub consolidation_model: String,
}

/// Build providers from configuration.
///
/// Missing API keys are not an error here; the provider reports
/// `NotConfigured` on first use.
pub fn build_from_config(config: &AppConfig) -> ProviderSet {
    let api_key = config.api_key.clone().unwrap_or_default();

    ProviderSet {
        answer: build_one("answer", &config.answer, &api_key),
        answer_model: config.answer.model.clone(),
        answer_max_tokens: config.answer.max_tokens,
        consolidation: build_one("consolidation", &config.consolidation, &api_key),
        consolidation_model: config.consolidation.model.clone(),
    }
}

fn build_one(name: &str, model: &ModelConfig, api_key: &str) -> Arc<dyn Provider> {
    Arc::new(OpenAiCompatProvider::new(name, &model.api_url, api_key))
}
