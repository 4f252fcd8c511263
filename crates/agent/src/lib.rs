//! The answer pipeline — the heart of clinq.
//!
//! One question flows through:
//!
//! 1. **Sanitize** the question and **retrieve** context from every source
//! 2. **Assemble** the system prompt (persona, audience, memory, citation policy, context)
//! 3. **Stream** the model's answer to the caller as it is generated
//! 4. **On completion**: persist the turn, consolidate user memory, record analytics
//!
//! Step 4 never affects the response: its failures are logged and dropped.

pub mod answer;
pub mod consolidator;
pub mod context;
pub mod pipeline;
pub mod post_stream;
pub mod stream_event;

pub use answer::{AnswerStream, AnswerStreamer, INCOMPLETE_WARNING, strip_references};
pub use consolidator::{MemoryConsolidator, MemoryUpdate, NO_UPDATE_SENTINEL};
pub use context::{AnswerStyle, AssembledPrompt, AssemblyInput, PromptAssembler, SectionStats};
pub use pipeline::{AnswerHandle, AnswerPipeline, AskRequest, ProfileHints, Stores};
pub use post_stream::{BackgroundJob, PostStreamRunner, SettleReport, TurnRecord, settle_all};
pub use stream_event::StreamOutcome;

#[cfg(test)]
pub(crate) mod test_helpers;
