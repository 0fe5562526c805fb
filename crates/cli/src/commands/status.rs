//! `zerotohire status` and `zerotohire stats`.

use zerotohire_config::AppConfig;
use zerotohire_core::session::SessionState;

use super::{CliResult, build_controller, friendly, load_config};

pub async fn run(json: bool) -> CliResult {
    let config = load_config()?;
    let controller = build_controller(&config).await?;
    let status = controller.status().await.map_err(friendly)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("ZeroToHire Status");
    println!("=================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Engine:       {} ({})", status.engine, config.inference.model);
    println!("  Store:        {} ({})", status.store, config.store_path().display());
    println!("  Problems:     {}", status.corpus_size);
    println!("  Tutor:        {}", controller.tutor_name());
    println!("  Code context: {}", if status.include_code_in_context { "on" } else { "off" });
    println!();

    let state = match status.state {
        SessionState::Idle => "idle",
        SessionState::ProblemSelected => "problem selected",
        SessionState::Conversing => "conversing",
    };
    println!("  Session:      {state}, {} messages", status.messages);
    if let Some(active) = &status.active_problem {
        println!(
            "  Problem:      #{} {} ({}){}",
            active.id,
            active.title,
            active.difficulty,
            if status.completed { " ✅" } else { "" }
        );
    }

    Ok(())
}

pub async fn stats(json: bool) -> CliResult {
    let controller = super::controller().await?;
    let stats = controller.stats().await.map_err(friendly)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Progress");
    println!("========");
    println!("  Attempted:  {}", stats.total_attempted);
    println!("  Completed:  {} ({:.1}%)", stats.total_completed, stats.completion_rate);
    for (difficulty, count) in &stats.completed_by_difficulty {
        println!("    {difficulty:<8} {count}");
    }
    println!("  Messages:   {}", stats.total_messages);
    Ok(())
}
