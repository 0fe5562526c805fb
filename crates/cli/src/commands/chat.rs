//! `zerotohire chat`: interactive or single-message tutoring.
//!
//! Plain lines go to the tutor, unless they read like a request for a new
//! problem ("give me a graph problem"), which runs problem selection instead.
//! Lines starting with `/` are commands; see [`HELP`].

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use zerotohire_core::corpus::ProblemCorpus;
use zerotohire_core::problem::ProblemId;
use zerotohire_tutor::{SessionController, SubmissionKind, TutorStreamEvent, detect_problem_request};

use super::evaluate::language_for;
use super::{CliResult, build_controller, friendly, load_config, print_problem, print_tutor};

const HELP: &str = "\
  /problem [request]   Pick a problem (\"/problem trees\"); empty for random
  /id <n>              Pick a problem by id
  /code <file>         Save your code for the current problem
  /submit <file>       Submit a file for review
  /context on|off      Include saved code in the tutor's context
  /status              Show the current session
  /complete            Mark the current problem as solved
  /incomplete          Mark it as not solved
  /clear               Clear the conversation (keeps the problem)
  /help                Show this help
  /quit                Leave";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Command { name: &'a str, arg: &'a str },
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if matches!(line, "exit" | "quit") {
        return Input::Quit;
    }
    match line.strip_prefix('/') {
        Some(rest) => {
            let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match name {
                "quit" | "exit" | "q" => Input::Quit,
                _ => Input::Command {
                    name,
                    arg: arg.trim(),
                },
            }
        }
        None => Input::Message(line),
    }
}

pub async fn run(message: Option<String>, code: Option<PathBuf>, stream: bool) -> CliResult {
    let config = load_config()?;
    let controller = build_controller(&config).await?;

    let code = match code {
        Some(path) => Some(read_code(&path)?),
        None => None,
    };

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let outcome = controller.converse(&msg, code.as_deref()).await;
        eprint!("\r              \r");
        match outcome {
            Ok(turn) => println!("{}", turn.message.content),
            Err(e) => return Err(friendly(e).into()),
        }
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        ZeroToHire: Interactive Tutoring        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Tutor:     {}", controller.tutor_name());
    println!("  Engine:    {} ({})", config.inference.provider, config.inference.model);
    println!("  Problems:  {}", controller.corpus().len());
    match controller.active_problem().await {
        Ok(Some(problem)) => println!("  Current:   #{} {}", problem.id, problem.title),
        Ok(None) => println!("  Current:   none (try \"give me an array problem\")"),
        Err(e) => eprintln!("  [Error] {}", friendly(e)),
    }
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!("  Ctrl+C stops a reply; /quit leaves.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Command { name, arg } => {
                if let Err(e) = command(&controller, name, arg, stream).await {
                    eprintln!("  [Error] {e}");
                }
            }
            Input::Message(text) => {
                if let Err(e) = message_turn(&controller, text, code.as_deref(), stream).await {
                    eprintln!("  [Error] {e}");
                }
            }
        }
    }

    println!();
    println!("  Good luck with your interviews! 👋");
    println!();
    Ok(())
}

async fn message_turn(
    controller: &SessionController,
    text: &str,
    code: Option<&str>,
    stream: bool,
) -> CliResult {
    if let Some(request) = detect_problem_request(text) {
        return select(controller, &request).await;
    }

    if stream {
        let rx = controller
            .converse_stream(text, code)
            .await
            .map_err(friendly)?;
        render_stream(controller.tutor_name(), rx).await
    } else {
        let turn = controller.converse(text, code).await.map_err(friendly)?;
        print_tutor(controller.tutor_name(), &turn.message.content);
        Ok(())
    }
}

async fn command(
    controller: &SessionController,
    name: &str,
    arg: &str,
    stream: bool,
) -> CliResult {
    match name {
        "help" | "h" => println!("\n{HELP}\n"),
        "problem" | "p" => select(controller, arg).await?,
        "id" => {
            let id: u64 = arg.parse().map_err(|_| format!("Not a problem id: '{arg}'"))?;
            let outcome = controller
                .select_problem_by_id(ProblemId(id))
                .await
                .map_err(friendly)?;
            print_problem(&outcome.problem);
            print_tutor(controller.tutor_name(), &outcome.message.content);
        }
        "code" => {
            let path = required_path(arg)?;
            let code = read_code(path)?;
            let snapshot = controller
                .save_code(&code, language_for(path))
                .await
                .map_err(friendly)?;
            println!("  Saved {} lines of {}.", snapshot.code.lines().count(), snapshot.language);
        }
        "submit" => {
            let path = required_path(arg)?;
            let code = read_code(path)?;
            let language = language_for(path);
            if stream {
                let (kind, rx) = controller
                    .evaluate_submission_stream(&code, language)
                    .await
                    .map_err(friendly)?;
                print_kind(kind);
                render_stream(controller.tutor_name(), rx).await?;
            } else {
                let outcome = controller
                    .evaluate_submission(&code, language)
                    .await
                    .map_err(friendly)?;
                print_kind(outcome.kind);
                print_tutor(controller.tutor_name(), &outcome.turn.message.content);
            }
        }
        "context" => {
            let include = match arg {
                "on" | "true" | "yes" => true,
                "off" | "false" | "no" => false,
                "" => {
                    let include = controller.include_code_in_context().await.map_err(friendly)?;
                    println!("  Code in context: {}", if include { "on" } else { "off" });
                    return Ok(());
                }
                other => return Err(format!("Expected on or off, got '{other}'").into()),
            };
            controller
                .set_include_code_in_context(include)
                .await
                .map_err(friendly)?;
            println!("  Code in context: {}", if include { "on" } else { "off" });
        }
        "status" => {
            let status = controller.status().await.map_err(friendly)?;
            match &status.active_problem {
                Some(active) => println!(
                    "  #{} {} ({}){}",
                    active.id,
                    active.title,
                    active.difficulty,
                    if status.completed { ", completed" } else { "" }
                ),
                None => println!("  No problem selected."),
            }
            println!("  {} messages in history", status.messages);
        }
        "complete" => {
            controller.set_completed(true).await.map_err(friendly)?;
            println!("  🎉 Marked as completed.");
        }
        "incomplete" => {
            controller.set_completed(false).await.map_err(friendly)?;
            println!("  Marked as not completed.");
        }
        "clear" => {
            controller.clear_history(None).await.map_err(friendly)?;
            println!("  Conversation cleared.");
        }
        other => return Err(format!("Unknown command '/{other}'. Try /help.").into()),
    }
    Ok(())
}

async fn select(controller: &SessionController, request: &str) -> CliResult {
    let outcome = controller.select_problem(request).await.map_err(friendly)?;
    tracing::debug!(stage = ?outcome.stage, "Selection stage");
    print_problem(&outcome.problem);
    print_tutor(controller.tutor_name(), &outcome.message.content);
    Ok(())
}

/// Print fragments as they arrive; Ctrl+C drops the reply.
async fn render_stream(name: &str, mut rx: mpsc::Receiver<TutorStreamEvent>) -> CliResult {
    print!("\n  {name} > ");
    std::io::stdout().flush()?;

    let mut streamed = String::new();
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n  [Interrupted: reply discarded]\n");
                return Ok(());
            }
            event = rx.recv() => event,
        };

        match event {
            Some(TutorStreamEvent::Fragment { content }) => {
                print!("{}", content.replace('\n', "\n  "));
                std::io::stdout().flush()?;
                streamed.push_str(&content);
            }
            Some(TutorStreamEvent::Done {
                message, fallback, ..
            }) => {
                println!();
                // The stream is raw model text; show the stored reply if cleaning changed it.
                if fallback || message.content.trim() != streamed.trim() {
                    print_tutor(name, &message.content);
                } else {
                    println!();
                }
                return Ok(());
            }
            Some(TutorStreamEvent::Error { message }) => {
                println!();
                return Err(message.into());
            }
            None => {
                println!();
                return Ok(());
            }
        }
    }
}

fn print_kind(kind: SubmissionKind) {
    if kind == SubmissionKind::Boilerplate {
        println!("  (Looks like a starting template. Let's get some logic in there.)");
    }
}

fn required_path(arg: &str) -> CliResult<&Path> {
    if arg.is_empty() {
        return Err("Give a file path, e.g. /submit solution.py".into());
    }
    Ok(Path::new(arg))
}

fn read_code(path: &Path) -> CliResult<String> {
    Ok(std::fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse_input("  how do I start?  "), Input::Message("how do I start?"));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn slash_commands_split_name_and_argument() {
        assert_eq!(
            parse_input("/problem  binary trees "),
            Input::Command {
                name: "problem",
                arg: "binary trees"
            }
        );
        assert_eq!(parse_input("/status"), Input::Command { name: "status", arg: "" });
    }

    #[test]
    fn quit_forms() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("exit"), Input::Quit);
        assert_eq!(parse_input("/q"), Input::Quit);
    }
}
