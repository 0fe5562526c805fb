//! Session housekeeping: `clear`, `reset`, `complete`, `incomplete`, `settings`.

use zerotohire_core::problem::ProblemId;

use super::{CliResult, controller, friendly};

pub async fn clear(problem: Option<u64>, all: bool) -> CliResult {
    let controller = controller().await?;
    if all {
        controller.clear_session().await.map_err(friendly)?;
        println!("✅ Session cleared. No problem is selected.");
    } else {
        let scope = problem.map(ProblemId);
        controller.clear_history(scope).await.map_err(friendly)?;
        match scope {
            Some(id) => println!("✅ Cleared messages for problem #{id}."),
            None => println!("✅ Conversation cleared."),
        }
    }
    Ok(())
}

pub async fn reset(id: u64) -> CliResult {
    let controller = controller().await?;
    controller.reset_problem(ProblemId(id)).await.map_err(friendly)?;
    println!("✅ Problem #{id} reset: messages, saved code, and progress removed.");
    Ok(())
}

pub async fn set_completed(completed: bool) -> CliResult {
    let controller = controller().await?;
    let session = controller.set_completed(completed).await.map_err(friendly)?;
    let title = session
        .active_problem
        .map(|a| a.title)
        .unwrap_or_default();
    if completed {
        println!("🎉 '{title}' marked as completed.");
    } else {
        println!("'{title}' marked as not completed.");
    }
    Ok(())
}

pub async fn settings(include_code: Option<bool>) -> CliResult {
    let controller = controller().await?;
    if let Some(include) = include_code {
        controller
            .set_include_code_in_context(include)
            .await
            .map_err(friendly)?;
    }
    let include = controller.include_code_in_context().await.map_err(friendly)?;
    println!("  include_code_in_context = {include}");
    Ok(())
}
