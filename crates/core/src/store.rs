//! Persistence collaborators — conversation history, user profiles, analytics.
//!
//! The core only appends history, reads a profile at turn start, overwrites
//! the memory text at turn end, and emits analytics events. Schemas and
//! deletion belong to the implementations.

use crate::error::StoreError;
use crate::message::ConversationId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub conversation_id: ConversationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub question: String,

    /// The answer as persisted (trailing reference list removed).
    pub answer: String,

    pub created_at: DateTime<Utc>,
}

/// Per-user profile hints read at the start of a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,

    /// Audience grade, e.g. "GP", "FY1", "Practice nurse".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,

    /// The consolidated memory text; also used as custom instructions.
    #[serde(default)]
    pub custom_instructions: String,
}

/// A fire-and-forget usage event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub event_type: String,

    #[serde(default)]
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(
        user_id: Option<String>,
        event_type: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            user_id,
            event_type: event_type.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Append-only conversation history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one user/assistant turn.
    async fn append_turn(&self, turn: ConversationTurn) -> std::result::Result<(), StoreError>;

    /// All turns of a conversation, oldest first.
    async fn turns(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Vec<ConversationTurn>, StoreError>;
}

/// User profile storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, user_id: &str) -> std::result::Result<Option<Profile>, StoreError>;

    /// Overwrite the stored memory text for `user_id`, creating the profile if needed.
    async fn save_memory(&self, user_id: &str, memory: &str) -> std::result::Result<(), StoreError>;
}

/// Analytics event sink.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: AnalyticsEvent) -> std::result::Result<(), StoreError>;
}
