//! The answer pipeline — one clinical question from request to stream.
//!
//! 1. **Validate** the conversation (non-empty, ends with a user message)
//! 2. **Load** stored profile hints for the user
//! 3. **Sanitize** the question and **retrieve** context from all sources
//! 4. **Assemble** the system prompt with the citation policy
//! 5. **Stream** the answer back to the caller
//! 6. On stream completion, hand the turn to the **post-stream runner**
//!
//! Steps 1–5 run in the request; an error there is returned before any byte
//! is streamed. Step 6 is driven by the stream's completion event in a
//! detached task and can never affect the response.

use std::sync::Arc;

use clinq_config::AppConfig;
use clinq_core::error::{Error, Result};
use clinq_core::message::{ConversationId, Message, Role};
use clinq_core::retrieval::SourceId;
use clinq_core::store::{AnalyticsSink, HistoryStore, Profile, ProfileStore};
use clinq_providers::ProviderSet;
use clinq_retrieval::{CircuitBreaker, RetrievalCoordinator, sanitize_query};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::answer::AnswerStreamer;
use crate::consolidator::MemoryConsolidator;
use crate::context::{AnswerStyle, AssemblyInput, PromptAssembler};
use crate::post_stream::{PostStreamRunner, SettleReport, TurnRecord};
use crate::stream_event::StreamOutcome;

/// Profile hints supplied with a request. Each field overrides the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileHints {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

/// One question, with the conversation so far.
#[derive(Debug, Clone)]
pub struct AskRequest {
    /// Chronological; the last entry is the question.
    pub messages: Vec<Message>,
    pub profile: ProfileHints,
    pub answer_style: AnswerStyle,
    pub conversation_id: Option<ConversationId>,
    pub save_to_history: bool,
}

/// A started answer.
pub struct AnswerHandle {
    pub conversation_id: ConversationId,
    /// Sources that contributed context to this answer.
    pub sources: Vec<SourceId>,
    /// Text chunks, forwarded as generated.
    pub body: BoxStream<'static, String>,
    /// Post-stream work. Resolves to `None` if the stream did not complete.
    /// Dropping the handle detaches it.
    pub background: JoinHandle<Option<SettleReport>>,
}

/// Storage collaborators.
#[derive(Clone)]
pub struct Stores {
    pub history: Arc<dyn HistoryStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

pub struct AnswerPipeline {
    coordinator: Arc<RetrievalCoordinator>,
    assembler: PromptAssembler,
    streamer: AnswerStreamer,
    runner: Arc<PostStreamRunner>,
    profiles: Arc<dyn ProfileStore>,
}

impl AnswerPipeline {
    pub fn new(
        coordinator: Arc<RetrievalCoordinator>,
        streamer: AnswerStreamer,
        consolidator: MemoryConsolidator,
        stores: Stores,
    ) -> Self {
        let runner = PostStreamRunner::new(
            stores.history,
            Arc::clone(&stores.profiles),
            stores.analytics,
            Arc::new(consolidator),
        );
        Self {
            coordinator,
            assembler: PromptAssembler::new(),
            streamer,
            runner: Arc::new(runner),
            profiles: stores.profiles,
        }
    }

    /// Wire the pipeline from configuration.
    pub fn from_config(
        config: &AppConfig,
        providers: ProviderSet,
        web_breaker: Arc<CircuitBreaker>,
        stores: Stores,
    ) -> Self {
        let coordinator = RetrievalCoordinator::from_config(&config.retrieval, web_breaker);
        let streamer = AnswerStreamer::new(
            providers.answer,
            providers.answer_model,
            Some(providers.answer_max_tokens),
        );
        let consolidator = MemoryConsolidator::new(
            providers.consolidation,
            providers.consolidation_model,
            Some(config.consolidation.max_tokens),
        );
        Self::new(Arc::new(coordinator), streamer, consolidator, stores)
    }

    pub fn coordinator(&self) -> &Arc<RetrievalCoordinator> {
        &self.coordinator
    }

    /// Start answering. Returns once the model has accepted the request.
    pub async fn ask(&self, request: AskRequest) -> Result<AnswerHandle> {
        // ── 1. Validate ────────────────────────────────────────────────────
        let question = validate(&request.messages)?.to_string();
        let conversation_id = request.conversation_id.clone().unwrap_or_default();
        let user_id = request.profile.user_id.clone().filter(|u| !u.is_empty());

        // ── 2. Stored profile ──────────────────────────────────────────────
        let stored = match &user_id {
            Some(uid) => self.load_profile(uid).await,
            None => None,
        };
        let grade = request
            .profile
            .grade
            .clone()
            .filter(|g| !g.trim().is_empty())
            .or_else(|| stored.as_ref().and_then(|p| p.grade.clone()));
        let stored_memory = stored.map(|p| p.custom_instructions);
        let custom_instructions = request
            .profile
            .custom_instructions
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| stored_memory.clone())
            .unwrap_or_default();
        // The consolidation baseline is what the store holds.
        let current_memory = stored_memory
            .or_else(|| request.profile.custom_instructions.clone())
            .unwrap_or_default();

        // ── 3. Retrieve ────────────────────────────────────────────────────
        let search_query = sanitize_query(&question);
        let context = self.coordinator.retrieve(&search_query).await;
        let sources = context.contributing_sources();

        // ── 4. Assemble ────────────────────────────────────────────────────
        let prompt = self.assembler.assemble(&AssemblyInput {
            context: &context,
            grade: grade.as_deref(),
            custom_instructions: &custom_instructions,
            style: request.answer_style,
        });
        debug!(
            conversation = %conversation_id,
            prompt_tokens = prompt.total_tokens,
            sources = ?sources,
            "System prompt assembled"
        );

        // ── 5. Stream ──────────────────────────────────────────────────────
        let history = sanitize_history(&request.messages);
        let stream = self.streamer.start(&prompt.system_prompt, &history).await?;

        // ── 6. Completion event → post-stream runner ───────────────────────
        let record = TurnRecord {
            conversation_id: conversation_id.clone(),
            user_id,
            question,
            answer: String::new(),
            usage: None,
            sources: sources.clone(),
            current_memory,
            save_to_history: request.save_to_history,
        };
        let runner = Arc::clone(&self.runner);
        let outcome = stream.outcome;

        let background = tokio::spawn(async move {
            match outcome.await {
                Ok(StreamOutcome::Completed { answer, usage }) => Some(
                    runner
                        .run(TurnRecord {
                            answer,
                            usage,
                            ..record
                        })
                        .await,
                ),
                Ok(StreamOutcome::Interrupted { partial, error }) => {
                    warn!(
                        conversation = %record.conversation_id,
                        error = %error,
                        partial_chars = partial.len(),
                        "Answer interrupted, skipping post-stream work"
                    );
                    None
                }
                Err(_) => {
                    info!(conversation = %record.conversation_id, "Client disconnected before the answer finished");
                    None
                }
            }
        });

        Ok(AnswerHandle {
            conversation_id,
            sources,
            body: stream.body,
            background,
        })
    }

    /// Profile read failures degrade to "no stored profile".
    async fn load_profile(&self, user_id: &str) -> Option<Profile> {
        match self.profiles.load(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id, error = %e, "Profile load failed, continuing without it");
                None
            }
        }
    }
}

/// The question text, or why the conversation cannot be answered.
pub fn validate(messages: &[Message]) -> Result<&str> {
    let last = messages
        .last()
        .ok_or_else(|| Error::InvalidRequest("messages must not be empty".into()))?;

    if last.role != Role::User {
        return Err(Error::InvalidRequest("the last message must come from the user".into()));
    }
    if last.content.trim().is_empty() {
        return Err(Error::InvalidRequest("the question must not be empty".into()));
    }
    Ok(&last.content)
}

/// User turns are sanitized; assistant turns pass through; client-supplied
/// system messages are dropped.
pub fn sanitize_history(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(Message::user(sanitize_query(&m.content))),
            Role::Assistant => Some(m.clone()),
            Role::System => None,
        })
        .collect()
}
