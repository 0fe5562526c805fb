//! CLI subcommands and the shared session bootstrap.

pub mod chat;
pub mod doctor;
pub mod evaluate;
pub mod onboard;
pub mod problem;
pub mod session;
pub mod status;

use std::sync::Arc;

use zerotohire_config::AppConfig;
use zerotohire_core::corpus::InMemoryCorpus;
use zerotohire_core::problem::Problem;
use zerotohire_core::store::SessionStore;
use zerotohire_store::{InMemoryStore, SqliteStore};
use zerotohire_tutor::SessionController;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn load_config() -> CliResult<AppConfig> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub fn load_corpus(config: &AppConfig) -> CliResult<Arc<InMemoryCorpus>> {
    let path = config.corpus_path();
    let corpus = InMemoryCorpus::from_json_file(&path).map_err(|e| {
        format!(
            "Failed to load problems from {}: {e}\n  Set [corpus] path in config.toml or ZEROTOHIRE_CORPUS.",
            path.display()
        )
    })?;
    Ok(Arc::new(corpus))
}

pub async fn open_store(config: &AppConfig) -> CliResult<Arc<dyn SessionStore>> {
    if config.store.backend == "memory" {
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let path = config.store_path();
    let store = SqliteStore::open(&path)
        .await
        .map_err(|e| format!("Failed to open session store at {}: {e}", path.display()))?;
    Ok(Arc::new(store))
}

/// Wire config, corpus, store, and engine into a controller.
pub async fn build_controller(config: &AppConfig) -> CliResult<SessionController> {
    let corpus = load_corpus(config)?;
    let store = open_store(config).await?;
    let engine = zerotohire_providers::build_from_config(config);
    Ok(SessionController::new(engine, store, corpus, config)?)
}

/// Load config and build a controller in one step.
pub async fn controller() -> CliResult<SessionController> {
    let config = load_config()?;
    build_controller(&config).await
}

/// Student-facing wording for a session error.
pub fn friendly(e: zerotohire_core::Error) -> String {
    tracing::debug!(error = %e, "Command failed");
    e.user_message()
}

/// Print a tutor message with a visible prefix on every line.
pub fn print_tutor(name: &str, content: &str) {
    println!();
    for line in content.lines() {
        println!("  {name} > {line}");
    }
    println!();
}

/// Print a problem's header, topics, and description.
pub fn print_problem(problem: &Problem) {
    println!();
    println!("  #{} {} ({})", problem.id, problem.title, problem.difficulty);
    if !problem.topics.is_empty() {
        let topics: Vec<&str> = problem.topics.iter().map(String::as_str).collect();
        println!("  Topics: {}", topics.join(", "));
    }
    if !problem.description.is_empty() {
        println!();
        for line in problem.description.lines() {
            println!("    {line}");
        }
    }
}
