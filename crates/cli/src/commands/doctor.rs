//! `zerotohire doctor`: diagnose setup and engine health.

use zerotohire_config::AppConfig;
use zerotohire_core::corpus::ProblemCorpus;

use super::{load_corpus, open_store};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 ZeroToHire Doctor");
    println!("====================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults. Run `zerotohire onboard` to create one");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config and re-run.");
            return Ok(());
        }
    };

    println!(
        "  ✅ Prompt budget: {} tokens ({} context, {} reserved, {} margin)",
        config.prompt_budget_tokens(),
        config.budget.model_context_tokens,
        config.reserved_output_tokens(),
        config.budget.safety_margin
    );

    match load_corpus(&config) {
        Ok(corpus) if corpus.is_empty() => {
            println!("  ❌ Problem set at {} is empty", config.corpus_path().display());
            issues += 1;
        }
        Ok(corpus) => println!("  ✅ {} problems loaded", corpus.len()),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    match open_store(&config).await {
        Ok(store) => match store.stats().await {
            Ok(stats) => println!(
                "  ✅ Session store ({}) readable, {} messages",
                store.name(),
                stats.total_messages
            ),
            Err(e) => {
                println!("  ❌ Session store unreadable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    let engine = zerotohire_providers::build_from_config(&config);
    match engine.health_check().await {
        Ok(true) => println!("  ✅ Inference engine '{}' reachable", engine.name()),
        Ok(false) => {
            println!("  ⚠️  Inference engine '{}' answered but reports unhealthy", engine.name());
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Inference engine '{}' unreachable: {e}", engine.name());
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
