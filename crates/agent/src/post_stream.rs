//! Post-stream task runner.
//!
//! Triggered by a `StreamOutcome::Completed` event, after the client has the
//! whole answer. Analytics is fired and forgotten. When the user opted into
//! history, persistence and memory consolidation run concurrently under
//! `settle_all`: each job is isolated in its own task, failures are logged
//! and collected, and nothing is ever re-raised.

use std::sync::Arc;

use chrono::Utc;
use clinq_core::error::Error;
use clinq_core::message::ConversationId;
use clinq_core::provider::Usage;
use clinq_core::retrieval::SourceId;
use clinq_core::store::{AnalyticsEvent, AnalyticsSink, ConversationTurn, HistoryStore, ProfileStore};
use futures::future::{BoxFuture, FutureExt, join_all};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::answer::strip_references;
use crate::consolidator::MemoryConsolidator;

/// A named unit of background work.
pub struct BackgroundJob {
    pub name: &'static str,
    pub future: BoxFuture<'static, Result<(), Error>>,
}

impl BackgroundJob {
    pub fn new(
        name: &'static str,
        future: impl std::future::Future<Output = Result<(), Error>> + Send + 'static,
    ) -> Self {
        Self {
            name,
            future: future.boxed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub name: &'static str,
    /// `Err` holds the logged failure message.
    pub result: Result<(), String>,
}

/// What happened to each settled job.
#[derive(Debug, Default, Clone)]
pub struct SettleReport {
    pub jobs: Vec<JobOutcome>,
}

impl SettleReport {
    pub fn succeeded(&self, name: &str) -> bool {
        self.jobs.iter().any(|j| j.name == name && j.result.is_ok())
    }

    pub fn failed(&self, name: &str) -> bool {
        self.jobs.iter().any(|j| j.name == name && j.result.is_err())
    }

    pub fn failures(&self) -> usize {
        self.jobs.iter().filter(|j| j.result.is_err()).count()
    }
}

/// Run every job concurrently and wait for all of them.
///
/// Each job runs in its own task, so an error or a panic in one cannot
/// affect the others. Never fails.
pub async fn settle_all(jobs: Vec<BackgroundJob>) -> SettleReport {
    let (names, handles): (Vec<&'static str>, Vec<JoinHandle<Result<(), Error>>>) = jobs
        .into_iter()
        .map(|job| (job.name, tokio::spawn(job.future)))
        .unzip();

    let results = join_all(handles).await;

    let jobs = names
        .into_iter()
        .zip(results)
        .map(|(name, joined)| {
            let result = match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(join_err) => Err(format!("task aborted: {join_err}")),
            };
            match &result {
                Ok(()) => debug!(job = name, "Background job finished"),
                Err(e) => warn!(job = name, error = %e, "Background job failed"),
            }
            JobOutcome { name, result }
        })
        .collect();

    SettleReport { jobs }
}

pub const PERSIST_JOB: &str = "persist_turn";
pub const CONSOLIDATE_JOB: &str = "consolidate_memory";
pub const ANALYTICS_EVENT: &str = "answer_streamed";

/// Everything the runner needs about one completed turn.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub conversation_id: ConversationId,
    pub user_id: Option<String>,
    /// The latest user message, unsanitized.
    pub question: String,
    /// The full answer as streamed.
    pub answer: String,
    pub usage: Option<Usage>,
    pub sources: Vec<SourceId>,
    /// Memory as stored at the start of the turn.
    pub current_memory: String,
    pub save_to_history: bool,
}

pub struct PostStreamRunner {
    history: Arc<dyn HistoryStore>,
    profiles: Arc<dyn ProfileStore>,
    analytics: Arc<dyn AnalyticsSink>,
    consolidator: Arc<MemoryConsolidator>,
}

impl PostStreamRunner {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        profiles: Arc<dyn ProfileStore>,
        analytics: Arc<dyn AnalyticsSink>,
        consolidator: Arc<MemoryConsolidator>,
    ) -> Self {
        Self {
            history,
            profiles,
            analytics,
            consolidator,
        }
    }

    /// Handle one completed turn. Never fails.
    pub async fn run(&self, record: TurnRecord) -> SettleReport {
        self.spawn_analytics(&record);

        if !record.save_to_history {
            debug!(conversation = %record.conversation_id, "History opt-out, skipping persistence");
            return SettleReport::default();
        }

        let mut jobs = vec![self.persist_job(&record)];
        if let Some(job) = self.consolidate_job(&record) {
            jobs.push(job);
        }

        let report = settle_all(jobs).await;
        info!(
            conversation = %record.conversation_id,
            jobs = report.jobs.len(),
            failures = report.failures(),
            "Post-stream work settled"
        );
        report
    }

    fn spawn_analytics(&self, record: &TurnRecord) {
        let usage = record.usage.unwrap_or_default();
        let event = AnalyticsEvent::new(
            record.user_id.clone(),
            ANALYTICS_EVENT,
            serde_json::json!({
                "conversation_id": record.conversation_id,
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.total_tokens,
                "sources": record.sources,
                "answer_chars": record.answer.chars().count(),
                "save_to_history": record.save_to_history,
            }),
        );
        let sink = Arc::clone(&self.analytics);

        tokio::spawn(async move {
            if let Err(e) = sink.record(event).await {
                warn!(job = "analytics", error = %e, "Analytics event dropped");
            }
        });
    }

    fn persist_job(&self, record: &TurnRecord) -> BackgroundJob {
        let history = Arc::clone(&self.history);
        let turn = ConversationTurn {
            conversation_id: record.conversation_id.clone(),
            user_id: record.user_id.clone(),
            question: record.question.clone(),
            answer: strip_references(&record.answer),
            created_at: Utc::now(),
        };

        BackgroundJob::new(PERSIST_JOB, async move {
            history.append_turn(turn).await?;
            Ok::<(), Error>(())
        })
    }

    /// Consolidation needs a user to write to.
    fn consolidate_job(&self, record: &TurnRecord) -> Option<BackgroundJob> {
        let user_id = record.user_id.clone()?;
        let consolidator = Arc::clone(&self.consolidator);
        let profiles = Arc::clone(&self.profiles);
        let current = record.current_memory.clone();
        let question = record.question.clone();

        Some(BackgroundJob::new(CONSOLIDATE_JOB, async move {
            let update = consolidator.consolidate(&current, &question).await?;
            match update.to_write(&current) {
                Some(text) => {
                    profiles.save_memory(&user_id, text).await?;
                    info!(user_id = %user_id, "User memory updated");
                }
                None => debug!(user_id = %user_id, "User memory unchanged"),
            }
            Ok::<(), Error>(())
        }))
    }
}
