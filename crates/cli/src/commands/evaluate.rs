//! `zerotohire evaluate` and `zerotohire save`: code against the active problem.

use std::path::{Path, PathBuf};

use zerotohire_tutor::SubmissionKind;

use super::{CliResult, controller, friendly, print_tutor};

/// Submission language from a file extension. Unknown extensions read as Python.
pub fn language_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "rs" => "rust",
        "java" => "java",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "c" | "h" => "c",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "kt" => "kotlin",
        "swift" => "swift",
        "rb" => "ruby",
        "cs" => "csharp",
        _ => "python",
    }
}

fn read(file: &Path) -> CliResult<String> {
    Ok(std::fs::read_to_string(file).map_err(|e| format!("Cannot read {}: {e}", file.display()))?)
}

pub async fn run(file: PathBuf, language: Option<String>) -> CliResult {
    let code = read(&file)?;
    let language = language.unwrap_or_else(|| language_for(&file).to_string());
    let controller = controller().await?;

    eprint!("  Reviewing...");
    let outcome = controller.evaluate_submission(&code, &language).await;
    eprint!("\r              \r");
    let outcome = outcome.map_err(friendly)?;

    if outcome.kind == SubmissionKind::Boilerplate {
        println!("  (Looks like a starting template.)");
    }
    print_tutor(controller.tutor_name(), &outcome.turn.message.content);
    Ok(())
}

pub async fn save(file: PathBuf, language: Option<String>) -> CliResult {
    let code = read(&file)?;
    let language = language.unwrap_or_else(|| language_for(&file).to_string());
    let controller = controller().await?;

    let snapshot = controller.save_code(&code, &language).await.map_err(friendly)?;
    println!(
        "✅ Saved {} lines of {} for problem #{}",
        snapshot.code.lines().count(),
        snapshot.language,
        snapshot.problem_id
    );
    Ok(())
}
