//! clinq CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a default config
//! - `serve`   — Start the HTTP gateway
//! - `ask`     — Answer one question and stream it to stdout

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "clinq",
    about = "clinq — clinical question answering with cited retrieval",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    Concise,
    Standard,
    Detailed,
}

impl From<Style> for clinq_agent::AnswerStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Concise => Self::Concise,
            Style::Standard => Self::Standard,
            Style::Detailed => Self::Detailed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single question
    Ask {
        /// The question
        question: String,

        /// Answer length and depth
        #[arg(short, long, value_enum, default_value = "standard")]
        style: Style,

        /// Stored profile to personalise with
        #[arg(long)]
        user_id: Option<String>,

        /// Clinical grade, e.g. "FY2" or "GP"
        #[arg(long)]
        grade: Option<String>,

        /// Persist the turn and update the user's memory
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port } => commands::gateway::run(port).await?,
        Commands::Ask {
            question,
            style,
            user_id,
            grade,
            save,
        } => {
            commands::ask::run(commands::ask::AskArgs {
                question,
                style: style.into(),
                user_id,
                grade,
                save,
            })
            .await?
        }
    }

    Ok(())
}
