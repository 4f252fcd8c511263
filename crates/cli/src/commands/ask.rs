//! `clinq ask` — Answer one question and stream it to stdout.

use std::io::Write;

use clinq_agent::{AnswerStyle, AskRequest, ProfileHints};
use clinq_config::AppConfig;
use clinq_core::message::Message;
use futures::StreamExt;

pub struct AskArgs {
    pub question: String,
    pub style: AnswerStyle,
    pub user_id: Option<String>,
    pub grade: Option<String>,
    pub save: bool,
}

pub async fn run(args: AskArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CLINQ_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add api_key to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    super::ensure_database_dir(&config.storage.database)?;
    let state = clinq_gateway::build_state(&config).await?;

    let handle = state
        .pipeline
        .ask(AskRequest {
            messages: vec![Message::user(args.question)],
            profile: ProfileHints {
                user_id: args.user_id,
                grade: args.grade,
                custom_instructions: None,
            },
            answer_style: args.style,
            conversation_id: None,
            save_to_history: args.save,
        })
        .await?;

    let mut body = handle.body;
    let mut stdout = std::io::stdout();
    while let Some(chunk) = body.next().await {
        stdout.write_all(chunk.as_bytes())?;
        stdout.flush()?;
    }
    drop(body);
    writeln!(stdout)?;

    // Let persistence and memory consolidation finish before exiting.
    if let Ok(Some(report)) = handle.background.await {
        if report.failures() > 0 {
            eprintln!("  {} background task(s) failed; see logs.", report.failures());
        }
    }

    if args.save {
        eprintln!("  conversation: {}", handle.conversation_id);
    }
    Ok(())
}
