//! `zerotohire problem` and `zerotohire problems`.

use zerotohire_core::corpus::ProblemCorpus;
use zerotohire_core::problem::{Difficulty, ProblemId};

use super::{CliResult, controller, friendly, load_config, load_corpus, print_problem, print_tutor};

/// Select a problem by free-text request, or by id.
pub async fn run(request: String, id: Option<u64>) -> CliResult {
    let controller = controller().await?;

    let outcome = match id {
        Some(id) => controller.select_problem_by_id(ProblemId(id)).await,
        None => controller.select_problem(&request).await,
    }
    .map_err(friendly)?;

    print_problem(&outcome.problem);
    print_tutor(controller.tutor_name(), &outcome.message.content);
    if let Some(stage) = outcome.stage {
        tracing::info!(%stage, problem_id = %outcome.problem.id, "Problem selected");
    }
    Ok(())
}

/// List the corpus, optionally filtered.
pub async fn list(topic: Option<String>, difficulty: Option<String>, filters: bool) -> CliResult {
    let config = load_config()?;
    let corpus = load_corpus(&config)?;

    if filters {
        let options = corpus.filter_options();
        let difficulties: Vec<&str> = options.difficulties.iter().map(|d| d.as_str()).collect();
        println!("Difficulties: {}", difficulties.join(", "));
        println!("Topics:");
        for topic in &options.topics {
            println!("  {topic}");
        }
        return Ok(());
    }

    let difficulty = difficulty.as_deref().map(Difficulty::parse);
    let mut shown = 0;
    for problem in corpus.problems() {
        if let Some(topic) = &topic
            && !problem.has_topic(topic)
        {
            continue;
        }
        if difficulty.is_some_and(|d| d != problem.difficulty) {
            continue;
        }
        println!(
            "{:>6}  {:<8}  {}",
            problem.id.to_string(),
            problem.difficulty.as_str(),
            problem.title
        );
        shown += 1;
    }
    println!("\n{shown} of {} problems", corpus.len());

    Ok(())
}
