//! Memory consolidator — folds the latest user message into the user's
//! running memory paragraph using the small completion model.
//!
//! The model answers with either the full replacement memory or the
//! `NO_UPDATE` sentinel. The sentinel never leaves this module: callers see
//! `MemoryUpdate::NoChange`.

use std::sync::Arc;

use clinq_core::error::ProviderError;
use clinq_core::message::Message;
use clinq_core::provider::{Provider, ProviderRequest};
use tracing::debug;

/// Literal the model returns when nothing durable changed.
pub const NO_UPDATE_SENTINEL: &str = "NO_UPDATE";

const CONSOLIDATION_TEMPERATURE: f32 = 0.0;

const SYSTEM_PROMPT: &str = "You maintain a short memory about a healthcare professional who uses \
a clinical question-answering assistant. You receive the CURRENT MEMORY and the LATEST USER MESSAGE.

Rules:
1. Only durable facts about the user belong in memory: their role or grade, specialty, workplace \
or setting, and lasting preferences for how answers are written.
2. Clinical questions are never memory. Ignore the question part of a message entirely.
3. If a message mixes a question with a durable fact (for example \"What are red flags for back \
pain? I am a GP.\"), keep ONLY the fact and update the memory with it. This is an update, not \
NO_UPDATE.
4. If the message contains no durable fact about the user (for example \"What is the dose of \
Aspirin?\"), reply with exactly NO_UPDATE and nothing else.
5. When a new fact contradicts the memory (for example a role change from GP to nurse), the new \
fact replaces the old one. Never keep both contradictory facts.
6. Otherwise reply with the COMPLETE new memory: one short paragraph in the third person that \
merges the current memory with the new fact. Not a diff, not a list of changes, no commentary.";

/// Result of one consolidation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryUpdate {
    /// Nothing durable changed.
    NoChange,
    /// The full replacement memory text.
    Updated(String),
}

impl MemoryUpdate {
    /// Interpret raw model output.
    ///
    /// Empty output is `NoChange` so a degenerate reply never wipes memory.
    pub fn parse(raw: &str) -> Self {
        let text = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '`' || c == '\'')
            .trim();

        if text.is_empty() {
            return Self::NoChange;
        }

        let bare = text.trim_end_matches('.');
        if bare.eq_ignore_ascii_case(NO_UPDATE_SENTINEL) {
            return Self::NoChange;
        }

        Self::Updated(text.to_string())
    }

    /// The text to persist, if any. Identical text is a no-write.
    pub fn to_write<'a>(&'a self, current: &str) -> Option<&'a str> {
        match self {
            Self::Updated(text) if text.trim() != current.trim() => Some(text.as_str()),
            _ => None,
        }
    }
}

pub struct MemoryConsolidator {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: Option<u32>,
}

impl MemoryConsolidator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, max_tokens: Option<u32>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
        }
    }

    pub fn build_request(&self, current_memory: &str, message: &str) -> ProviderRequest {
        let current = if current_memory.trim().is_empty() {
            "(empty)"
        } else {
            current_memory.trim()
        };

        ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(format!(
                    "CURRENT MEMORY:\n{current}\n\nLATEST USER MESSAGE:\n{}",
                    message.trim()
                )),
            ],
            temperature: CONSOLIDATION_TEMPERATURE,
            top_p: None,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }

    /// Merge `message` (raw, unsanitized) into `current_memory`.
    pub async fn consolidate(
        &self,
        current_memory: &str,
        message: &str,
    ) -> Result<MemoryUpdate, ProviderError> {
        let response = self
            .provider
            .complete(self.build_request(current_memory, message))
            .await?;

        let update = MemoryUpdate::parse(&response.message.content);
        debug!(
            changed = matches!(update, MemoryUpdate::Updated(_)),
            "Memory consolidation finished"
        );
        Ok(update)
    }
}
