//! Prompt assembly under a token budget.
//!
//! A prompt is built from these sections, in order:
//!
//! 1. **Preamble** (persona, behaviour, output format): never truncated
//! 2. **Code** (the student's current code): dropped last
//! 3. **Problem** (active problem or an instruction to pick one): title clamped
//! 4. **History** (recent user/tutor turns): window shrinks first
//! 5. **Instruction** (evaluation requests only): never truncated
//! 6. **Cue** (`<TutorName>:`)
//!
//! When the estimate exceeds the budget, the history window walks down the
//! configured sequence (default `5 → 3 → 1 → 0`), then the code section is
//! dropped. Construction fails if the fixed sections alone cannot fit, so
//! every prompt this assembler returns is within budget.
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs: no randomness, no clock, no I/O.

use serde::{Deserialize, Serialize};
use zerotohire_core::message::Role;
use zerotohire_core::problem::{ActiveProblemRef, Difficulty, ProblemId};
use zerotohire_core::session::Session;

use crate::context::preamble::{self, MAX_TITLE_CHARS, STUDENT_LABEL};
use crate::context::token::estimate_tokens;

const SECTION_SEPARATOR: &str = "\n\n";

// ── Types ─────────────────────────────────────────────────────────────────

/// The model's context window, split into prompt and reply allowances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBudget {
    pub model_context_tokens: usize,
    pub reserved_output_tokens: usize,
    pub safety_margin: usize,
}

impl PromptBudget {
    /// Tokens available for the assembled prompt.
    pub fn available(&self) -> usize {
        self.model_context_tokens
            .saturating_sub(self.reserved_output_tokens)
            .saturating_sub(self.safety_margin)
    }
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            model_context_tokens: 4096,
            reserved_output_tokens: 400,
            safety_margin: 128,
        }
    }
}

/// An assembled prompt plus how it was built.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub text: String,
    pub metadata: AssemblyMetadata,
}

/// Details of one assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Estimated tokens in the prompt.
    pub estimated_tokens: usize,
    /// Tokens available under the budget.
    pub budget: usize,
    /// The history window that fit.
    pub window_used: usize,
    /// History entries rendered.
    pub history_included: usize,
    /// History entries the largest window would have rendered but did not fit.
    pub history_dropped: usize,
    /// Whether a code section was rendered.
    pub code_included: bool,
    /// Whether a supplied code section was dropped to fit the budget.
    pub code_dropped: bool,
}

/// Errors from prompt assembly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    /// The fixed sections alone exceed the budget. Raised at construction.
    #[error("fixed prompt sections need {fixed_tokens} tokens but only {budget} are available")]
    BudgetTooSmall { fixed_tokens: usize, budget: usize },

    /// An instruction block cannot fit even with no history and no code.
    #[error("request is too large: needs {needed_tokens} prompt tokens, {budget} available")]
    InstructionTooLarge { needed_tokens: usize, budget: usize },

    /// The history window sequence is empty.
    #[error("at least one history window size is required")]
    NoWindows,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds bounded prompts. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    budget: PromptBudget,
    tutor_name: String,
    windows: Vec<usize>,
    preamble: String,
}

impl ContextAssembler {
    /// Create an assembler, checking that the fixed sections fit the budget.
    pub fn new(
        budget: PromptBudget,
        tutor_name: impl Into<String>,
        windows: Vec<usize>,
    ) -> Result<Self, AssemblyError> {
        if windows.is_empty() {
            return Err(AssemblyError::NoWindows);
        }

        let tutor_name = tutor_name.into();
        let assembler = Self {
            budget,
            preamble: preamble::preamble(&tutor_name),
            tutor_name,
            windows,
        };

        let fixed_tokens = assembler.fixed_overhead_tokens();
        if fixed_tokens > budget.available() {
            return Err(AssemblyError::BudgetTooSmall {
                fixed_tokens,
                budget: budget.available(),
            });
        }

        Ok(assembler)
    }

    /// Assembler with the default budget, persona "Alex", and windows `5, 3, 1, 0`.
    pub fn with_defaults() -> Result<Self, AssemblyError> {
        Self::new(PromptBudget::default(), "Alex", vec![5, 3, 1, 0])
    }

    pub fn tutor_name(&self) -> &str {
        &self.tutor_name
    }

    pub fn budget(&self) -> PromptBudget {
        self.budget
    }

    /// Assemble a conversational prompt.
    ///
    /// `code` should be `None` when code-in-context is switched off.
    pub fn assemble(&self, session: &Session, code: Option<&str>) -> AssembledPrompt {
        // With no instruction the fixed sections always fit; see `new`.
        self.build(session, code, None)
            .unwrap_or_else(|_| self.minimal(session))
    }

    /// Assemble a prompt with an extra instruction block before the cue.
    pub fn assemble_with_instruction(
        &self,
        session: &Session,
        code: Option<&str>,
        instruction: &str,
    ) -> Result<AssembledPrompt, AssemblyError> {
        self.build(session, code, Some(instruction))
    }

    fn build(
        &self,
        session: &Session,
        code: Option<&str>,
        instruction: Option<&str>,
    ) -> Result<AssembledPrompt, AssemblyError> {
        let available = self.budget.available();
        let dialogue: Vec<(Role, &str)> = session
            .dialogue()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        let largest_window = self.windows.iter().copied().max().unwrap_or(0);
        let history_wanted = largest_window.min(dialogue.len());
        let code = code.filter(|c| !c.trim().is_empty());
        let problem = session.active_problem.as_ref();

        let code_options: &[bool] = if code.is_some() { &[true, false] } else { &[false] };
        for &with_code in code_options {
            let windows: &[usize] = if with_code {
                &self.windows
            } else if code.is_some() {
                // Code is only dropped once the history is already empty.
                &[0]
            } else {
                &self.windows
            };

            for &window in windows {
                let take = window.min(dialogue.len());
                let history = &dialogue[dialogue.len() - take..];
                let text = self.render(
                    problem,
                    if with_code { code } else { None },
                    history,
                    instruction,
                );
                let estimated_tokens = estimate_tokens(&text);

                if estimated_tokens <= available {
                    let metadata = AssemblyMetadata {
                        estimated_tokens,
                        budget: available,
                        window_used: window,
                        history_included: take,
                        history_dropped: history_wanted.saturating_sub(take),
                        code_included: with_code,
                        code_dropped: code.is_some() && !with_code,
                    };
                    tracing::debug!(
                        tokens = estimated_tokens,
                        budget = available,
                        window,
                        code_included = with_code,
                        "Prompt assembled"
                    );
                    return Ok(AssembledPrompt { text, metadata });
                }
            }
        }

        let needed_tokens = estimate_tokens(&self.render(problem, None, &[], instruction));
        Err(AssemblyError::InstructionTooLarge {
            needed_tokens,
            budget: available,
        })
    }

    /// Preamble, problem section, and cue only.
    fn minimal(&self, session: &Session) -> AssembledPrompt {
        let text = self.render(session.active_problem.as_ref(), None, &[], None);
        let estimated_tokens = estimate_tokens(&text);
        AssembledPrompt {
            text,
            metadata: AssemblyMetadata {
                estimated_tokens,
                budget: self.budget.available(),
                window_used: 0,
                history_included: 0,
                history_dropped: 0,
                code_included: false,
                code_dropped: false,
            },
        }
    }

    fn render(
        &self,
        problem: Option<&ActiveProblemRef>,
        code: Option<&str>,
        history: &[(Role, &str)],
        instruction: Option<&str>,
    ) -> String {
        let mut sections: Vec<String> = Vec::with_capacity(6);
        sections.push(self.preamble.clone());

        if let Some(code) = code {
            sections.push(preamble::code_section(code));
        }

        sections.push(preamble::problem_section(problem));

        if !history.is_empty() {
            let turns: Vec<String> = history
                .iter()
                .map(|(role, content)| self.render_turn(*role, content))
                .collect();
            sections.push(turns.join("\n"));
        }

        if let Some(instruction) = instruction {
            sections.push(instruction.trim().to_string());
        }

        sections.push(preamble::cue(&self.tutor_name));
        sections.join(SECTION_SEPARATOR)
    }

    fn render_turn(&self, role: Role, content: &str) -> String {
        let label = match role {
            Role::User => STUDENT_LABEL,
            _ => self.tutor_name.as_str(),
        };
        format!("{label}: {}", content.trim())
    }

    /// Tokens for the sections that are never dropped, using the largest
    /// problem section this assembler can render.
    fn fixed_overhead_tokens(&self) -> usize {
        let widest = ActiveProblemRef {
            id: ProblemId(0),
            title: "W".repeat(MAX_TITLE_CHARS),
            difficulty: Difficulty::Unknown,
        };
        let with_problem = estimate_tokens(&self.render(Some(&widest), None, &[], None));
        let without_problem = estimate_tokens(&self.render(None, None, &[], None));
        with_problem.max(without_problem)
    }
}
