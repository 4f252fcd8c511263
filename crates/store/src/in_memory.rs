//! In-memory backend — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use clinq_core::error::StoreError;
use clinq_core::message::ConversationId;
use clinq_core::store::{
    AnalyticsEvent, AnalyticsSink, ConversationTurn, HistoryStore, Profile, ProfileStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Stores everything in process memory.
///
/// Counts memory writes so callers can assert on write idempotence.
#[derive(Default)]
pub struct InMemoryStore {
    turns: RwLock<Vec<ConversationTurn>>,
    profiles: RwLock<HashMap<String, Profile>>,
    events: RwLock<Vec<AnalyticsEvent>>,
    memory_writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile.
    pub async fn insert_profile(&self, profile: Profile) {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }

    /// Number of `save_memory` calls observed.
    pub fn memory_writes(&self) -> usize {
        self.memory_writes.load(Ordering::SeqCst)
    }

    pub async fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.read().await.clone()
    }

    pub async fn turn_count(&self) -> usize {
        self.turns.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        self.turns.write().await.push(turn);
        Ok(())
    }

    async fn turns(&self, conversation_id: &ConversationId) -> Result<Vec<ConversationTurn>, StoreError> {
        Ok(self
            .turns
            .read()
            .await
            .iter()
            .filter(|t| &t.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn load(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn save_memory(&self, user_id: &str, memory: &str) -> Result<(), StoreError> {
        self.memory_writes.fetch_add(1, Ordering::SeqCst);
        let mut profiles = self.profiles.write().await;
        let profile = profiles.entry(user_id.to_string()).or_insert_with(|| Profile {
            user_id: user_id.to_string(),
            ..Profile::default()
        });
        profile.custom_instructions = memory.to_string();
        Ok(())
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryStore {
    async fn record(&self, event: AnalyticsEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event);
        Ok(())
    }
}
