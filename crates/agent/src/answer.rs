//! Answer streamer — forwards model output to the caller as it is generated.
//!
//! The body stream accumulates the full answer as it forwards chunks. When
//! the provider's channel is exhausted the stream fires a `StreamOutcome`
//! on a oneshot channel, then ends. A provider error mid-stream appends a
//! visible warning instead of silently truncating. If the caller drops the
//! body, the oneshot sender and the provider receiver drop with it: the
//! provider's reader task stops and no outcome is ever sent.

use std::sync::Arc;

use clinq_core::error::ProviderError;
use clinq_core::message::Message;
use clinq_core::provider::{ChunkReceiver, Provider, ProviderRequest, Usage};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::stream_event::StreamOutcome;

/// Sampling policy for answers. Not caller-tunable.
pub const ANSWER_TEMPERATURE: f32 = 0.3;
pub const ANSWER_TOP_P: f32 = 0.9;

/// Appended to the live stream when generation fails part-way.
pub const INCOMPLETE_WARNING: &str =
    "\n\n---\n⚠️ The response was interrupted and may be incomplete. Please try again.";

/// A running answer: the body to forward and the completion event.
pub struct AnswerStream {
    pub body: BoxStream<'static, String>,
    pub outcome: oneshot::Receiver<StreamOutcome>,
}

pub struct AnswerStreamer {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: Option<u32>,
}

impl AnswerStreamer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, max_tokens: Option<u32>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
        }
    }

    /// System prompt first, then the conversation as given.
    pub fn build_request(&self, system_prompt: &str, history: &[Message]) -> ProviderRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system_prompt));
        messages.extend(history.iter().cloned());

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: ANSWER_TEMPERATURE,
            top_p: Some(ANSWER_TOP_P),
            max_tokens: self.max_tokens,
            stream: true,
        }
    }

    /// Start generation. An `Err` means nothing was streamed and the caller
    /// can still report a clean error.
    pub async fn start(
        &self,
        system_prompt: &str,
        history: &[Message],
    ) -> Result<AnswerStream, ProviderError> {
        let request = self.build_request(system_prompt, history);
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            messages = request.messages.len(),
            "Starting answer stream"
        );

        let rx = self.provider.stream(request).await?;
        let (outcome_tx, outcome_rx) = oneshot::channel();

        Ok(AnswerStream {
            body: forward(rx, outcome_tx),
            outcome: outcome_rx,
        })
    }
}

struct ForwardState {
    rx: ChunkReceiver,
    answer: String,
    usage: Option<Usage>,
    outcome_tx: Option<oneshot::Sender<StreamOutcome>>,
}

impl ForwardState {
    fn finish(&mut self, outcome: StreamOutcome) {
        if let Some(tx) = self.outcome_tx.take() {
            // Receiver gone means nobody is waiting for background work.
            let _ = tx.send(outcome);
        }
    }
}

fn forward(rx: ChunkReceiver, outcome_tx: oneshot::Sender<StreamOutcome>) -> BoxStream<'static, String> {
    let state = ForwardState {
        rx,
        answer: String::new(),
        usage: None,
        outcome_tx: Some(outcome_tx),
    };

    futures::stream::unfold(state, |mut state| async move {
        // Already finished (completed or interrupted).
        state.outcome_tx.as_ref()?;

        loop {
            match state.rx.recv().await {
                Some(Ok(chunk)) => {
                    if chunk.usage.is_some() {
                        state.usage = chunk.usage;
                    }
                    if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                        state.answer.push_str(&text);
                        return Some((text, state));
                    }
                    if chunk.done {
                        break;
                    }
                }
                Some(Err(error)) => {
                    warn!(error = %error, chars = state.answer.len(), "Answer stream interrupted");
                    let partial = std::mem::take(&mut state.answer);
                    state.finish(StreamOutcome::Interrupted { partial, error });
                    return Some((INCOMPLETE_WARNING.to_string(), state));
                }
                None => break,
            }
        }

        let answer = std::mem::take(&mut state.answer);
        let usage = state.usage;
        state.finish(StreamOutcome::Completed { answer, usage });
        None
    })
    .boxed()
}

/// Remove a trailing "References:" section from an answer.
///
/// Applied to the persisted copy only; the live stream is untouched.
pub fn strip_references(answer: &str) -> String {
    let mut cut_at = None;
    let mut offset = 0;
    for line in answer.split_inclusive('\n') {
        if is_references_heading(line) {
            cut_at = Some(offset);
        }
        offset += line.len();
    }

    match cut_at {
        Some(idx) => answer[..idx].trim_end().to_string(),
        None => answer.to_string(),
    }
}

fn is_references_heading(line: &str) -> bool {
    let stripped = line
        .trim()
        .trim_start_matches('#')
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());
    let lower = stripped.to_ascii_lowercase();
    match lower.strip_prefix("references") {
        Some(rest) => {
            let rest = rest.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());
            rest.is_empty() || rest.starts_with(':')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;

    async fn collect(stream: AnswerStream) -> (String, Option<StreamOutcome>) {
        let body: Vec<String> = stream.body.collect().await;
        (body.concat(), stream.outcome.await.ok())
    }

    #[test]
    fn request_uses_fixed_sampling_policy() {
        let streamer = AnswerStreamer::new(Arc::new(ScriptedProvider::streaming(&["x"])), "gpt-4o", Some(1024));
        let req = streamer.build_request("SYSTEM", &[Message::user("q")]);
        assert_eq!(req.messages[0], Message::system("SYSTEM"));
        assert_eq!(req.messages[1], Message::user("q"));
        assert!((req.temperature - ANSWER_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(req.top_p, Some(ANSWER_TOP_P));
        assert_eq!(req.max_tokens, Some(1024));
        assert!(req.stream);
    }

    #[tokio::test]
    async fn forwards_chunks_and_reports_completion() {
        let provider = Arc::new(ScriptedProvider::streaming(&["First-line ", "is ", "amoxicillin."]));
        let streamer = AnswerStreamer::new(provider, "gpt-4o", None);

        let stream = streamer.start("SYSTEM", &[Message::user("CAP?")]).await.unwrap();
        let (text, outcome) = collect(stream).await;

        assert_eq!(text, "First-line is amoxicillin.");
        match outcome {
            Some(StreamOutcome::Completed { answer, usage }) => {
                assert_eq!(answer, "First-line is amoxicillin.");
                assert_eq!(usage.unwrap().total_tokens, 15);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mid_stream_error_appends_warning() {
        let provider = Arc::new(
            ScriptedProvider::streaming(&["Partial "])
                .failing_mid_stream(ProviderError::StreamInterrupted("connection reset".into())),
        );
        let streamer = AnswerStreamer::new(provider, "gpt-4o", None);

        let stream = streamer.start("SYSTEM", &[Message::user("q")]).await.unwrap();
        let (text, outcome) = collect(stream).await;

        assert!(text.starts_with("Partial "));
        assert!(text.ends_with(INCOMPLETE_WARNING));
        assert!(matches!(outcome, Some(StreamOutcome::Interrupted { ref partial, .. }) if partial == "Partial "));
    }

    #[tokio::test]
    async fn upfront_error_is_returned_before_streaming() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::NotConfigured("no key".into())));
        let streamer = AnswerStreamer::new(provider, "gpt-4o", None);
        assert!(matches!(
            streamer.start("SYSTEM", &[Message::user("q")]).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn dropping_the_body_sends_no_outcome() {
        let provider = Arc::new(ScriptedProvider::streaming(&["a", "b", "c"]));
        let streamer = AnswerStreamer::new(provider, "gpt-4o", None);

        let mut stream = streamer.start("SYSTEM", &[Message::user("q")]).await.unwrap();
        assert_eq!(stream.body.next().await.as_deref(), Some("a"));
        drop(stream.body);

        assert!(stream.outcome.await.is_err());
    }

    #[test]
    fn strips_trailing_references_section() {
        let answer = "Offer an ACE inhibitor [NICE NG136].\n\nReferences:\n1. NICE NG136 (2019)\n";
        assert_eq!(strip_references(answer), "Offer an ACE inhibitor [NICE NG136].");
    }

    #[test]
    fn strips_markdown_references_heading() {
        let answer = "Answer body.\n\n## **References**\n- Smith et al. BMJ 2021";
        assert_eq!(strip_references(answer), "Answer body.");
    }

    #[test]
    fn keeps_answer_without_references() {
        let answer = "See the references in the guideline for details.";
        assert_eq!(strip_references(answer), answer);
    }
}
