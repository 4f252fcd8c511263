//! Context & citation assembler.
//!
//! Builds the answering model's system prompt from fixed sections in a fixed
//! order:
//!
//! 1. **Persona** — who the assistant is and who it serves
//! 2. **Style** — verbosity modifier from `AnswerStyle`
//! 3. **Audience** — the user's grade, when known
//! 4. **Citation policy** — which context may be cited and which must not be
//! 5. **User memory** — consolidated custom instructions
//! 6. **Context** — retrieved fragments: local, then academic, then web
//!
//! Assembly is deterministic: identical inputs produce identical prompts.

use crate::context::token;
use clinq_core::retrieval::{RetrievedContext, SourceId};
use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────

/// Requested answer verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    Concise,
    #[default]
    Standard,
    Detailed,
}

impl AnswerStyle {
    fn instruction(&self) -> &'static str {
        match self {
            Self::Concise => {
                "STYLE: Be concise. Lead with the direct answer in one or two sentences, \
                 then at most five short bullet points. Omit background the clinician already knows."
            }
            Self::Standard => {
                "STYLE: Give a focused answer. Start with the direct answer, then the key \
                 management points, doses and safety-netting advice, using short paragraphs or bullets."
            }
            Self::Detailed => {
                "STYLE: Give a thorough answer. Cover assessment, differential diagnosis, \
                 investigations, management options with doses, follow-up and referral criteria, \
                 using headings where they help."
            }
        }
    }
}

/// All inputs the assembler needs for one turn.
pub struct AssemblyInput<'a> {
    pub context: &'a RetrievedContext,
    /// Audience grade, e.g. "GP" or "FY1".
    pub grade: Option<&'a str>,
    /// Consolidated user memory / custom instructions. May be empty.
    pub custom_instructions: &'a str,
    pub style: AnswerStyle,
}

/// The assembled system prompt plus sizing metadata for logs.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub sections: Vec<SectionStats>,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionStats {
    pub name: String,
    pub tokens: usize,
}

// ── Fixed text ────────────────────────────────────────────────────────────

const PERSONA: &str = "You are clinq, a clinical decision-support assistant for UK healthcare \
professionals. Answer clinical questions accurately and safely in line with current UK practice \
(NICE, SIGN, CKS and the BNF). You support clinical judgement; you do not replace it. Say so \
plainly when evidence is uncertain, and flag red-flag features that need urgent action.";

const NO_CONTEXT: &str = "No retrieved context is available for this question. Answer from your \
general clinical knowledge without citations.";

fn citation_policy() -> String {
    let local = SourceId::Local.label();
    let academic = SourceId::Academic.label();
    let web = SourceId::Web.label();
    format!(
        "CITATION POLICY (mandatory, not optional):\n\
         - Content taken from the \"{local}\" or \"{academic}\" sections MUST be cited inline, \
         naming the guideline, document or paper it came from.\n\
         - Content taken from the \"{web}\" section MUST be used where relevant but must NEVER be \
         cited, linked or attributed. Do not mention that section or its websites. Present that \
         information as your own general clinical knowledge.\n\
         - Anything not covered by the context comes from your general clinical knowledge and is \
         written in standard phrasing without citations.\n\
         - If you cited anything, end the answer with a \"References:\" section listing only \
         \"{local}\" and \"{academic}\" sources."
    )
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Stateless — create one and reuse it.
#[derive(Debug, Default, Clone)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledPrompt {
        let mut sections: Vec<(&'static str, String)> = Vec::new();

        // ── 1. Persona ─────────────────────────────────────────────────────
        sections.push(("persona", PERSONA.to_string()));

        // ── 2. Style ───────────────────────────────────────────────────────
        sections.push(("style", input.style.instruction().to_string()));

        // ── 3. Audience ────────────────────────────────────────────────────
        if let Some(grade) = input.grade.map(str::trim).filter(|g| !g.is_empty()) {
            sections.push((
                "audience",
                format!("AUDIENCE: The user is a {grade}. Pitch terminology and depth for that grade."),
            ));
        }

        // ── 4. Citation policy ─────────────────────────────────────────────
        sections.push(("citation_policy", citation_policy()));

        // ── 5. User memory ─────────────────────────────────────────────────
        let memory = input.custom_instructions.trim();
        if !memory.is_empty() {
            sections.push((
                "user_memory",
                format!(
                    "USER MEMORY AND PREFERENCES (apply unless they conflict with safety or the citation policy):\n{memory}"
                ),
            ));
        }

        // ── 6. Context: local → academic → web ─────────────────────────────
        let fragments: Vec<&str> = input
            .context
            .fragments()
            .iter()
            .filter(|f| f.is_present())
            .map(|f| f.text.trim())
            .collect();
        let context_body = if fragments.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            fragments.join("\n\n")
        };
        sections.push(("context", format!("CONTEXT:\n\n{context_body}")));

        let stats: Vec<SectionStats> = sections
            .iter()
            .map(|(name, text)| SectionStats {
                name: (*name).into(),
                tokens: token::estimate_tokens(text),
            })
            .collect();
        let total_tokens = stats.iter().map(|s| s.tokens).sum();

        AssembledPrompt {
            system_prompt: sections
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join("\n\n"),
            sections: stats,
            total_tokens,
        }
    }
}
