//! Property tests for response cleaning and prompt assembly.

use proptest::prelude::*;
use zerotohire_core::message::Message;
use zerotohire_core::problem::{ActiveProblemRef, Difficulty, ProblemId};
use zerotohire_core::session::Session;
use zerotohire_tutor::context::estimate_tokens;
use zerotohire_tutor::{ContextAssembler, PromptBudget, ResponseCleaner, extract_code_blocks};

/// Model-output-like text: fences (some opened mid-line), reasoning tags,
/// speaker labels, stage directions, filler, and whitespace runs.
fn model_output() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        Just("```".to_string()),
        Just("```python\n".to_string()),
        Just("\n```\n".to_string()),
        Just("Try this: ```".to_string()),
        Just("`".to_string()),
        Just("<think>".to_string()),
        Just("</think>".to_string()),
        Just("<response>".to_string()),
        Just("</thought>".to_string()),
        Just("Student: ".to_string()),
        Just("Alex: ".to_string()),
        Just("User:".to_string()),
        Just("(pauses)".to_string()),
        Just("*nods*".to_string()),
        Just("hmm, ".to_string()),
        Just("let me think... ".to_string()),
        Just("   ".to_string()),
        Just("\t".to_string()),
        Just("\n\n\n\n".to_string()),
        Just(":".to_string()),
        "[a-z (){}*:=]{0,12}",
    ];
    prop::collection::vec(piece, 0..24).prop_map(|pieces| pieces.concat())
}

fn session(turns: &[(bool, String)], title: String) -> Session {
    let history = turns
        .iter()
        .map(|(from_student, body)| {
            let message = if *from_student {
                Message::user(body.clone())
            } else {
                Message::tutor(body.clone())
            };
            message.with_problem(ProblemId(1))
        })
        .collect();
    Session::new(
        history,
        Some(ActiveProblemRef {
            id: ProblemId(1),
            title,
            difficulty: Difficulty::Medium,
        }),
    )
}

proptest! {
    #[test]
    fn cleaning_is_idempotent(raw in model_output()) {
        let cleaner = ResponseCleaner::new("Alex");
        let once = cleaner.clean(&raw);
        prop_assert_eq!(cleaner.clean(&once), once);
    }

    #[test]
    fn cleaning_preserves_code_blocks(raw in model_output()) {
        let cleaner = ResponseCleaner::new("Alex");
        prop_assert_eq!(extract_code_blocks(&cleaner.clean(&raw)), extract_code_blocks(&raw));
    }

    #[test]
    fn cleaning_handles_arbitrary_text(raw in "\\PC{0,300}") {
        let cleaner = ResponseCleaner::new("Alex");
        let once = cleaner.clean(&raw);
        prop_assert_eq!(extract_code_blocks(&once), extract_code_blocks(&raw));
        prop_assert_eq!(cleaner.clean(&once), once);
    }

    #[test]
    fn assembled_prompt_fits_budget(
        model_context_tokens in 2000usize..8192,
        turns in prop::collection::vec((any::<bool>(), "[ -~\n]{0,600}"), 0..25),
        code in prop::option::of("[ -~\n]{0,20000}"),
        title in "[A-Za-z ]{0,200}",
    ) {
        let budget = PromptBudget {
            model_context_tokens,
            reserved_output_tokens: 400,
            safety_margin: 128,
        };
        let assembler = ContextAssembler::new(budget, "Alex", vec![5, 3, 1, 0]);
        prop_assume!(assembler.is_ok());
        let assembler = assembler.unwrap();

        let prompt = assembler.assemble(&session(&turns, title), code.as_deref());
        prop_assert!(estimate_tokens(&prompt.text) <= budget.available());
        prop_assert!(prompt.metadata.estimated_tokens <= prompt.metadata.budget);
        prop_assert!(prompt.text.ends_with("Alex:"));
    }

    #[test]
    fn instruction_prompt_fits_budget_or_is_rejected(
        turns in prop::collection::vec((any::<bool>(), "[ -~\n]{0,400}"), 0..12),
        instruction in "[ -~\n]{0,16000}",
    ) {
        let assembler = ContextAssembler::with_defaults().unwrap();
        let budget = assembler.budget().available();
        if let Ok(prompt) = assembler.assemble_with_instruction(
            &session(&turns, "Two Sum".into()),
            Some("print(1)"),
            &instruction,
        ) {
            prop_assert!(estimate_tokens(&prompt.text) <= budget);
        }
    }
}
