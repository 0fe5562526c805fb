//! ZeroToHire CLI: the main entry point.
//!
//! Commands:
//! - `onboard`    Initialize config and data directory
//! - `chat`       Interactive tutoring session (or a single message)
//! - `problem`    Pick a problem by request or id
//! - `problems`   List the corpus
//! - `evaluate`   Submit a code file for review
//! - `status`     Show the current session
//! - `stats`      Show progress statistics
//! - `doctor`     Diagnose setup and engine health

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "zerotohire",
    about = "ZeroToHire: a Socratic tutor for coding interview problems",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "ZEROTOHIRE_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and data directory
    Onboard,

    /// Talk to the tutor
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// A file with your current code, included as context
        #[arg(short, long)]
        code: Option<PathBuf>,

        /// Wait for complete replies instead of streaming
        #[arg(long)]
        no_stream: bool,
    },

    /// Pick a problem to work on
    Problem {
        /// What you want, e.g. "a dynamic programming problem". Empty for random.
        request: Vec<String>,

        /// Select a specific problem by id
        #[arg(long, conflicts_with = "request")]
        id: Option<u64>,
    },

    /// List problems in the corpus
    Problems {
        /// Only problems with this topic
        #[arg(short, long)]
        topic: Option<String>,

        /// Only problems of this difficulty (Easy, Medium, Hard)
        #[arg(short, long)]
        difficulty: Option<String>,

        /// Show the available topics and difficulties instead
        #[arg(long)]
        filters: bool,
    },

    /// Submit a code file for review against the active problem
    Evaluate {
        /// Path to the solution file
        file: PathBuf,

        /// Language of the submission (defaults from the file extension)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Save code for the active problem without asking for a review
    Save {
        file: PathBuf,

        #[arg(short, long)]
        language: Option<String>,
    },

    /// Show the current session
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show progress statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Clear conversation history
    Clear {
        /// Only clear messages for this problem
        #[arg(long)]
        problem: Option<u64>,

        /// Also unset the active problem
        #[arg(long, conflicts_with = "problem")]
        all: bool,
    },

    /// Remove every trace of a problem (messages, code, progress)
    Reset { id: u64 },

    /// Mark the active problem as completed
    Complete,

    /// Mark the active problem as not completed
    Incomplete,

    /// View or change session settings
    Settings {
        /// Include your saved code in the tutor's context
        #[arg(long)]
        include_code: Option<bool>,
    },

    /// Diagnose setup and engine health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            code,
            no_stream,
        } => commands::chat::run(message, code, !no_stream).await?,
        Commands::Problem { request, id } => commands::problem::run(request.join(" "), id).await?,
        Commands::Problems {
            topic,
            difficulty,
            filters,
        } => commands::problem::list(topic, difficulty, filters).await?,
        Commands::Evaluate { file, language } => commands::evaluate::run(file, language).await?,
        Commands::Save { file, language } => commands::evaluate::save(file, language).await?,
        Commands::Status { json } => commands::status::run(json).await?,
        Commands::Stats { json } => commands::status::stats(json).await?,
        Commands::Clear { problem, all } => commands::session::clear(problem, all).await?,
        Commands::Reset { id } => commands::session::reset(id).await?,
        Commands::Complete => commands::session::set_completed(true).await?,
        Commands::Incomplete => commands::session::set_completed(false).await?,
        Commands::Settings { include_code } => commands::session::settings(include_code).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
