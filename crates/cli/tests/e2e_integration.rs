//! End-to-end integration tests for clinq.
//!
//! These drive the HTTP gateway over the full pipeline: sanitization,
//! retrieval fan-out, prompt assembly, streaming, and post-stream work
//! against a real SQLite store. Only the model and the search backends are
//! mocked.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use clinq_agent::{AnswerPipeline, AnswerStreamer, MemoryConsolidator, Stores};
use clinq_core::error::{ProviderError, RetrievalError};
use clinq_core::message::{ConversationId, Message};
use clinq_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use clinq_core::retrieval::{ContextSource, SourceId};
use clinq_core::store::{HistoryStore, ProfileStore};
use clinq_gateway::{GatewayState, HealthResponse, build_router};
use clinq_retrieval::{BreakerState, CircuitBreaker, RetrievalCoordinator, SourceAdapter};
use clinq_store::SqliteStore;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Streams a fixed answer and replies to completions with a fixed memory.
struct ScriptedProvider {
    chunks: Vec<String>,
    memory_reply: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(chunks: &[&str], memory_reply: &str) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            memory_reply: memory_reply.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn streamed(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().iter().filter(|r| r.stream).cloned().collect()
    }

    fn completed(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().iter().filter(|r| !r.stream).cloned().collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            message: Message::assistant(self.memory_reply.clone()),
            usage: None,
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = tokio::sync::mpsc::channel(self.chunks.len() + 1);
        for chunk in &self.chunks {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(chunk.clone()),
                    done: false,
                    usage: None,
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                content: None,
                done: true,
                usage: Some(Usage {
                    prompt_tokens: 200,
                    completion_tokens: 40,
                    total_tokens: 240,
                }),
            }))
            .await;
        Ok(rx)
    }
}

// ── Mock Sources ─────────────────────────────────────────────────────────

struct RecordingSource {
    id: SourceId,
    result: Result<String, RetrievalError>,
    queries: Mutex<Vec<String>>,
}

impl RecordingSource {
    fn ok(id: SourceId, body: &str) -> Arc<Self> {
        Arc::new(Self {
            id,
            result: Ok(format!("{}\n{body}", id.header())),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn failing(id: SourceId) -> Arc<Self> {
        Arc::new(Self {
            id,
            result: Err(RetrievalError::QuotaExhausted("plan limit reached".into())),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContextSource for RecordingSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.result.clone()
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    app: axum::Router,
    provider: Arc<ScriptedProvider>,
    store: Arc<SqliteStore>,
    local: Arc<RecordingSource>,
    web: Arc<RecordingSource>,
}

async fn harness(provider: ScriptedProvider, web: Arc<RecordingSource>) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let local = RecordingSource::ok(SourceId::Local, "[Source: NICE NG59]\nRefer urgently if cauda equina is suspected.");
    let academic = RecordingSource::ok(SourceId::Academic, "Title: Red flags in low back pain\nJournal: BMJ (2020)");
    let web_breaker = Arc::new(CircuitBreaker::new());
    let timeout = Duration::from_secs(2);

    let coordinator = RetrievalCoordinator::new(
        SourceAdapter::new(local.clone(), timeout),
        SourceAdapter::new(academic, timeout),
        SourceAdapter::new(web.clone(), timeout).with_breaker(web_breaker.clone()),
    );
    let pipeline = AnswerPipeline::new(
        Arc::new(coordinator),
        AnswerStreamer::new(provider.clone(), "gpt-4o", Some(2048)),
        MemoryConsolidator::new(provider.clone(), "gpt-4o-mini", Some(300)),
        Stores {
            history: store.clone(),
            profiles: store.clone(),
            analytics: store.clone(),
        },
    );

    let app = build_router(Arc::new(GatewayState {
        pipeline: Arc::new(pipeline),
        history: store.clone(),
        web_breaker,
    }));

    Harness {
        app,
        provider,
        store,
        local,
        web,
    }
}

fn ask(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/ask")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_text(app: &axum::Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ── E2E: Full question flow ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_mixed_intent_question_streams_persists_and_remembers() {
    let h = harness(
        ScriptedProvider::new(
            &[
                "Refer urgently if cauda equina is suspected [NICE NG59].",
                "\n\nReferences:\n1. NICE NG59 Low back pain and sciatica",
            ],
            "User is a GP.",
        ),
        RecordingSource::ok(SourceId::Web, "Patient.info: back pain red flags"),
    )
    .await;

    let (status, text) = read_text(
        &h.app,
        ask(serde_json::json!({
            "messages": [{"role": "user", "content": "What are red flags for back pain? I am a GP."}],
            "profile": {"userId": "u1"},
            "conversationId": "conv-e2e",
            "saveToHistory": true
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("[NICE NG59]"));
    assert!(text.contains("References:"));

    // Post-stream work lands after the body is complete.
    let store = h.store.clone();
    wait_for(|| {
        let store = store.clone();
        async move {
            store.load("u1").await.unwrap().is_some()
                && !store.turns(&ConversationId::from("conv-e2e")).await.unwrap().is_empty()
        }
    })
    .await;

    let turns = h.store.turns(&ConversationId::from("conv-e2e")).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_id.as_deref(), Some("u1"));
    assert_eq!(turns[0].answer, "Refer urgently if cauda equina is suspected [NICE NG59].");

    let profile = h.store.load("u1").await.unwrap().unwrap();
    assert_eq!(profile.custom_instructions, "User is a GP.");

    // The consolidator saw the raw message; the answer model saw the policy and all three sections.
    let consolidation = &h.provider.completed()[0];
    assert!(consolidation.messages[1].content.contains("I am a GP."));

    let system = &h.provider.streamed()[0].messages[0].content;
    assert!(system.contains("=== Local Knowledge Base ==="));
    assert!(system.contains("=== Academic Literature ==="));
    assert!(system.contains("=== Trusted Web Sources ==="));
    assert!(system.contains("must NEVER be cited"));
}

#[tokio::test]
async fn e2e_stored_memory_personalises_the_next_answer() {
    let h = harness(
        ScriptedProvider::new(&["Answer."], "NO_UPDATE"),
        RecordingSource::ok(SourceId::Web, "BNF"),
    )
    .await;
    h.store.save_memory("u2", "User is a practice nurse.").await.unwrap();

    let (status, _) = read_text(
        &h.app,
        ask(serde_json::json!({
            "messages": [{"role": "user", "content": "What is the dose of Aspirin?"}],
            "profile": {"userId": "u2"},
            "saveToHistory": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let system = &h.provider.streamed()[0].messages[0].content;
    assert!(system.contains("User is a practice nurse."));

    // NO_UPDATE leaves the stored memory untouched.
    let provider = h.provider.clone();
    wait_for(|| {
        let provider = provider.clone();
        async move { !provider.completed().is_empty() }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let profile = h.store.load("u2").await.unwrap().unwrap();
    assert_eq!(profile.custom_instructions, "User is a practice nurse.");
}

// ── E2E: Sanitization ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_identifiers_never_reach_search_or_model() {
    let h = harness(
        ScriptedProvider::new(&["Assess urgently."], "NO_UPDATE"),
        RecordingSource::ok(SourceId::Web, "NHS"),
    )
    .await;

    let (status, _) = read_text(
        &h.app,
        ask(serde_json::json!({
            "messages": [{
                "role": "user",
                "content": "Mr. Smith, DOB 12/04/1980, NHS 123456789, 54 year old male patient with chest pain"
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let expected = "[NAME], DOB [DATE], NHS [ID], 54-year-old patient with chest pain";
    assert_eq!(h.local.queries(), vec![expected.to_string()]);
    assert_eq!(h.web.queries(), vec![expected.to_string()]);

    let sent = &h.provider.streamed()[0];
    let user = sent.messages.last().unwrap();
    assert_eq!(user.content, expected);
    assert!(sent.messages.iter().all(|m| !m.content.contains("123456789")));
}

// ── E2E: Degradation ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_web_failure_opens_breaker_for_later_requests() {
    let h = harness(
        ScriptedProvider::new(&["Answer from the remaining sources."], "NO_UPDATE"),
        RecordingSource::failing(SourceId::Web),
    )
    .await;

    for _ in 0..3 {
        let (status, text) = read_text(
            &h.app,
            ask(serde_json::json!({"messages": [{"role": "user", "content": "CAP antibiotics?"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "Answer from the remaining sources.");
    }

    // One real call trips the breaker; later requests skip the source.
    assert_eq!(h.web.queries().len(), 1);
    assert_eq!(h.local.queries().len(), 3);

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = read_text(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(health.web_search, BreakerState::Open);
}

#[tokio::test]
async fn e2e_opt_out_records_analytics_only() {
    let h = harness(
        ScriptedProvider::new(&["Answer."], "User is a GP."),
        RecordingSource::ok(SourceId::Web, "NICE CKS"),
    )
    .await;

    let (status, _) = read_text(
        &h.app,
        ask(serde_json::json!({
            "messages": [{"role": "user", "content": "I am a GP. Hypertension targets?"}],
            "profile": {"userId": "u3"},
            "conversationId": "private",
            "saveToHistory": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let store = h.store.clone();
    wait_for(|| {
        let store = store.clone();
        async move { store.analytics_count().await.unwrap() == 1 }
    })
    .await;

    assert!(h.store.turns(&ConversationId::from("private")).await.unwrap().is_empty());
    assert!(h.store.load("u3").await.unwrap().is_none());
    assert!(h.provider.completed().is_empty());
}

#[tokio::test]
async fn e2e_rejects_conversation_without_a_question() {
    let h = harness(
        ScriptedProvider::new(&["unused"], "NO_UPDATE"),
        RecordingSource::ok(SourceId::Web, "unused"),
    )
    .await;

    let (status, body) = read_text(
        &h.app,
        ask(serde_json::json!({
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": "a"}
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("last message"));
    assert!(h.provider.streamed().is_empty());
    assert!(h.local.queries().is_empty());
}
