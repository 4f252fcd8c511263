//! System prompt assembly.
//!
//! | Section | Source | Present when |
//! |---------|--------|--------------|
//! | 1. Persona | fixed | always |
//! | 2. Style | `AnswerStyle` | always |
//! | 3. Audience | profile grade | grade known |
//! | 4. Citation policy | fixed | always |
//! | 5. User memory | profile / request | non-empty |
//! | 6. Context | retrieval fragments | always (may state none found) |

pub mod assembler;
pub mod token;

pub use assembler::{AnswerStyle, AssembledPrompt, AssemblyInput, PromptAssembler, SectionStats};
