//! Code submission review: boilerplate detection and the review instruction.

use serde::{Deserialize, Serialize};

/// How much of a submission is the student's own work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    /// Only signatures, placeholders and comments
    Boilerplate,
    /// At least one line of real logic
    Substantive,
}

/// Statements that stand in for a missing body.
const PLACEHOLDERS: &[&str] = &[
    "pass",
    "...",
    "return",
    "return;",
    "todo!()",
    "unimplemented!()",
    "{",
    "}",
    "};",
    "{}",
];

const COMMENT_PREFIXES: &[&str] = &["#", "//", "/*", "*/", "* "];

/// Languages where `--` starts a line comment rather than a decrement.
const DASH_COMMENT_LANGUAGES: &[&str] = &["sql", "mysql", "postgresql", "lua", "haskell"];

const DECLARATION_PREFIXES: &[&str] = &[
    "class ",
    "def ",
    "async def ",
    "fn ",
    "pub fn ",
    "impl ",
    "function ",
    "func ",
    "public ",
    "private ",
    "protected ",
    "static ",
    "struct ",
    "import ",
    "from ",
    "use ",
    "package ",
    "#include",
    "using ",
];

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "else", "elif", "match", "catch"];

/// Classify code by its non-blank lines.
pub fn classify_submission(code: &str, language: &str) -> SubmissionKind {
    let dash_comments = DASH_COMMENT_LANGUAGES
        .iter()
        .any(|lang| language.trim().eq_ignore_ascii_case(lang));
    let substantive = code
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .any(|line| !is_boilerplate_line(line, dash_comments));

    if substantive {
        SubmissionKind::Substantive
    } else {
        SubmissionKind::Boilerplate
    }
}

fn is_boilerplate_line(line: &str, dash_comments: bool) -> bool {
    if PLACEHOLDERS.contains(&line) || line == "*" {
        return true;
    }
    if COMMENT_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return true;
    }
    if dash_comments && line.starts_with("--") {
        return true;
    }
    if line.ends_with("-> None:") || line.ends_with(": None:") {
        return true;
    }
    if DECLARATION_PREFIXES.iter().any(|p| line.starts_with(p)) && !line.contains('=') {
        return true;
    }
    looks_like_signature(line)
}

/// `vector<int> twoSum(vector<int>& nums, int target) {` and the like.
fn looks_like_signature(line: &str) -> bool {
    let opens_body = line.ends_with('{') || line.ends_with(':');
    let first_word = line
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default();
    opens_body
        && line.contains('(')
        && !line.contains('=')
        && !CONTROL_KEYWORDS.contains(&first_word)
}

/// The instruction block appended to the prompt for a code review.
pub fn evaluation_instruction(
    kind: SubmissionKind,
    title: &str,
    code: &str,
    language: &str,
) -> String {
    let code = code.trim_end();
    match kind {
        SubmissionKind::Boilerplate => format!(
            "The student submitted only the boilerplate code for \"{title}\":\n\
```{language}\n{code}\n```\n\n\
This is just the function signature with no implementation. As their Socratic tutor:\n\
- Ask them what the first step should be\n\
- Guide them to think about the problem requirements\n\
- Don't give away the solution, but help them identify what they need to implement\n\n\
Be encouraging but point out they need to start implementing logic."
        ),
        SubmissionKind::Substantive => format!(
            "The student has submitted the following {language} code for the problem \"{title}\":\n\
```{language}\n{code}\n```\n\n\
As their Socratic tutor, analyze this code:\n\
- Ask questions about their approach\n\
- If there are bugs, guide them to find them through questions\n\
- If it's correct, ask them to explain how it works\n\
- Suggest improvements through questioning, not direct answers\n\n\
Be encouraging and use questions to guide their learning."
        ),
    }
}
