//! Shared test helpers for agent tests.

use clinq_core::error::{ProviderError, StoreError};
use clinq_core::message::{ConversationId, Message};
use clinq_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
use clinq_core::store::{AnalyticsEvent, ConversationTurn, HistoryStore};
use clinq_store::InMemoryStore;
use std::sync::Mutex;
use std::time::Duration;

fn usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

/// A mock provider with scripted streaming chunks and completion replies.
///
/// Completions are returned in order; the last reply repeats once the
/// script runs out. Every request is recorded.
pub struct ScriptedProvider {
    chunks: Vec<String>,
    completions: Vec<String>,
    mid_stream_error: Option<ProviderError>,
    upfront_error: Option<ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_count: Mutex<usize>,
}

impl ScriptedProvider {
    fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            completions: Vec::new(),
            mid_stream_error: None,
            upfront_error: None,
            requests: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
        }
    }

    pub fn streaming(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::empty()
        }
    }

    pub fn completing(replies: &[&str]) -> Self {
        Self {
            completions: replies.iter().map(|c| c.to_string()).collect(),
            ..Self::empty()
        }
    }

    /// Every call fails before anything is generated.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            upfront_error: Some(error),
            ..Self::empty()
        }
    }

    /// After the scripted chunks, the stream yields `error` instead of finishing.
    pub fn failing_mid_stream(mut self, error: ProviderError) -> Self {
        self.mid_stream_error = Some(error);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: ProviderRequest) {
        *self.call_count.lock().unwrap() += 1;
        self.requests.lock().unwrap().push(request);
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let index = *self.call_count.lock().unwrap();
        let model = request.model.clone();
        self.record(request);

        if let Some(e) = &self.upfront_error {
            return Err(e.clone());
        }

        let reply = self
            .completions
            .get(index)
            .or_else(|| self.completions.last())
            .cloned()
            .unwrap_or_default();

        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: Some(usage()),
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.record(request);

        if let Some(e) = &self.upfront_error {
            return Err(e.clone());
        }

        let (tx, rx) = tokio::sync::mpsc::channel(self.chunks.len() + 2);
        for chunk in &self.chunks {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(chunk.clone()),
                    done: false,
                    usage: None,
                }))
                .await;
        }

        let last = match &self.mid_stream_error {
            Some(e) => Err(e.clone()),
            None => Ok(StreamChunk {
                content: None,
                done: true,
                usage: Some(usage()),
            }),
        };
        let _ = tx.send(last).await;

        Ok(rx)
    }
}

/// History store whose writes always fail.
pub struct FailingHistory;

#[async_trait::async_trait]
impl HistoryStore for FailingHistory {
    async fn append_turn(&self, _turn: ConversationTurn) -> Result<(), StoreError> {
        Err(StoreError::Storage("database is locked".into()))
    }

    async fn turns(&self, _conversation_id: &ConversationId) -> Result<Vec<ConversationTurn>, StoreError> {
        Ok(Vec::new())
    }
}

/// Poll the store until `count` analytics events arrive (or give up after ~2s).
pub async fn wait_for_events(store: &InMemoryStore, count: usize) -> Vec<AnalyticsEvent> {
    for _ in 0..200 {
        let events = store.events().await;
        if events.len() >= count {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.events().await
}
