//! Response post-processing: raw model output → deliverable tutor message.
//!
//! Text is split into fenced code blocks and prose with a paired-delimiter
//! scan: the first ```` ``` ```` anywhere opens a block and the next one closes
//! it, fences included. An unclosed block runs to the end of the text. Code
//! blocks pass through byte-for-byte; every rule below touches prose only:
//!
//! 1. Paired reasoning blocks (`<think>…</think>` and friends) are removed with their content
//! 2. Stray reasoning/response tags are removed
//! 3. A leading restatement of the tutor's own label is stripped
//! 4. Prose is cut at the first leaked speaker label; later prose is dropped, later code kept
//! 5. Short `(stage directions)` and `*stage directions*` are removed
//! 6. Filler phrases ("let me think", "hmm") are removed
//! 7. Whitespace is normalized: space runs, trailing blanks, runs of 3+ blank lines
//! 8. A trailing colon at the very end of the message is removed
//!
//! A prose segment whose cleaning would join backticks into a new fence is
//! left as it was, so the block layout of the output matches the input.
//! Cleaning repeats until the text stops changing, so `clean` is idempotent.

use std::sync::LazyLock;

use regex_lite::Regex;

static REASONING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:thought|think|reasoning)>.*?</(?:thought|think|reasoning)>")
        .expect("reasoning block pattern is valid")
});

static STRAY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:thought|think|reasoning|response)>").expect("tag pattern is valid")
});

static PAREN_DIRECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\w])\([a-z][a-z ]{2,28}(?:\.\.\.)?\)").expect("direction pattern is valid")
});

static STAR_DIRECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\w*])\*[a-z][a-z ]{2,28}(?:\.\.\.)?\*").expect("direction pattern is valid")
});

static META_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:let me think(?: about (?:this|that|it))?|let me see|hmm+)\b(?:\.\.\.|[.,!:])?[ \t]*")
        .expect("meta phrase pattern is valid")
});

static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)[ \t]{2,}").expect("space pattern is valid"));

static LEADING_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]{2,}").expect("leading space pattern is valid"));

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{4,}").expect("blank line pattern is valid"));

const FENCE: &str = "```";

/// One piece of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Prose(&'a str),
    /// A fenced block including its fence lines
    Code(&'a str),
}

/// Cleans model output for one tutor persona.
#[derive(Debug, Clone)]
pub struct ResponseCleaner {
    tutor_name: String,
    own_label: Regex,
    leaked_label: Regex,
}

impl ResponseCleaner {
    pub fn new(tutor_name: impl Into<String>) -> Self {
        let tutor_name = tutor_name.into();
        let name = regex_lite::escape(&tutor_name);
        let own_label = Regex::new(&format!(r"^\s*(?:(?:{name}|Tutor|Assistant)[ \t]*:\s*)+"))
            .expect("escaped label pattern is valid");
        let leaked_label = Regex::new(&format!(
            r"\b(?:Student|User|Human|Assistant|Tutor|{name}):"
        ))
        .expect("escaped label pattern is valid");

        Self {
            tutor_name,
            own_label,
            leaked_label,
        }
    }

    pub fn tutor_name(&self) -> &str {
        &self.tutor_name
    }

    /// Clean raw model output. `clean(clean(x)) == clean(x)`.
    pub fn clean(&self, raw: &str) -> String {
        let mut current = self.clean_once(raw);
        loop {
            let next = self.clean_once(&current);
            // Every rule only deletes, so this terminates.
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn clean_once(&self, text: &str) -> String {
        let segments = split_segments(text);
        let mut out: Vec<(bool, String)> = Vec::with_capacity(segments.len());
        let mut truncated = false;

        for (index, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Code(code) => out.push((false, (*code).to_string())),
                Segment::Prose(_) if truncated => {}
                Segment::Prose(prose) => {
                    // Prose is always followed by code or nothing.
                    let before_code = index + 1 < segments.len();
                    let (cleaned, cut) = self.clean_prose(prose, index == 0);
                    if forges_fence(&cleaned, before_code) {
                        out.push((true, (*prose).to_string()));
                    } else {
                        out.push((true, cleaned));
                        truncated = cut;
                    }
                }
            }
        }

        if let Some((true, first)) = out.first_mut() {
            *first = first.trim_start().to_string();
        }
        if let Some((true, last)) = out.last_mut() {
            let mut trimmed = last.trim_end();
            if let Some(stripped) = trimmed.strip_suffix(':') {
                trimmed = stripped.trim_end();
            }
            *last = trimmed.to_string();
        }

        out.into_iter().map(|(_, s)| s).collect()
    }

    /// Returns the cleaned prose and whether a leaked label cut it short.
    fn clean_prose(&self, prose: &str, at_message_start: bool) -> (String, bool) {
        let mut text = REASONING_BLOCK.replace_all(prose, "").into_owned();
        text = STRAY_TAG.replace_all(&text, "").into_owned();

        if at_message_start {
            text = self.own_label.replace(&text, "").into_owned();
        }

        let mut truncated = false;
        if let Some(found) = self.leaked_label.find(&text) {
            text.truncate(found.start());
            truncated = true;
        }

        text = PAREN_DIRECTION.replace_all(&text, "$1").into_owned();
        text = STAR_DIRECTION.replace_all(&text, "$1").into_owned();
        text = META_PHRASE.replace_all(&text, "").into_owned();
        text = SPACE_RUN.replace_all(&text, "$1 ").into_owned();
        if !at_message_start {
            // Prose after a code block continues the fence's line.
            text = LEADING_RUN.replace(&text, " ").into_owned();
        }
        text = trim_line_ends(&text);
        text = BLANK_RUN.replace_all(&text, "\n\n").into_owned();

        (text, truncated)
    }
}

/// Every fenced block in `text`, fences included, in order.
pub fn extract_code_blocks(text: &str) -> Vec<String> {
    split_segments(text)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Code(code) => Some(code.to_string()),
            Segment::Prose(_) => None,
        })
        .collect()
}

fn split_segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;

    while let Some(found) = text[start..].find(FENCE) {
        let open = start + found;
        if open > start {
            segments.push(Segment::Prose(&text[start..open]));
        }
        let body = open + FENCE.len();
        match text[body..].find(FENCE) {
            Some(close) => {
                let end = body + close + FENCE.len();
                segments.push(Segment::Code(&text[open..end]));
                start = end;
            }
            None => {
                segments.push(Segment::Code(&text[open..]));
                return segments;
            }
        }
    }

    if start < text.len() {
        segments.push(Segment::Prose(&text[start..]));
    }
    segments
}

/// Whether cleaned prose would change where fences fall: it holds a fence of
/// its own, or a trailing backtick would merge into the next opening fence.
fn forges_fence(cleaned: &str, before_code: bool) -> bool {
    cleaned.contains(FENCE) || (before_code && cleaned.ends_with('`'))
}

/// Trims blanks before each newline. A final unterminated line is left for
/// the message-level trim, since it may run into an inline fence.
fn trim_line_ends(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        match line.strip_suffix('\n') {
            Some(body) => {
                out.push_str(body.trim_end_matches([' ', '\t', '\r']));
                out.push('\n');
            }
            None => out.push_str(line),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> ResponseCleaner {
        ResponseCleaner::new("Alex")
    }

    #[test]
    fn plain_text_unchanged() {
        let text = "What is the time complexity of a nested loop over the array?";
        assert_eq!(cleaner().clean(text), text);
    }

    #[test]
    fn strips_reasoning_blocks_and_stray_tags() {
        let raw = "<think>the student needs a hint</think>Try a hash map.</response>";
        assert_eq!(cleaner().clean(raw), "Try a hash map.");

        let raw = "<thought>\nplan\n</thought>\n<response>Good question!";
        assert_eq!(cleaner().clean(raw), "Good question!");

        assert_eq!(cleaner().clean("</thought>Start small."), "Start small.");
    }

    #[test]
    fn strips_leading_own_label() {
        assert_eq!(cleaner().clean("Alex: Alex: What would you try first?"), "What would you try first?");
        assert_eq!(cleaner().clean("Tutor: Hi!"), "Hi!");
    }

    #[test]
    fn truncates_at_leaked_label() {
        let raw = "What's your first idea?\nStudent: I'd sort it.\nAlex: Great!";
        assert_eq!(cleaner().clean(raw), "What's your first idea?");

        let raw = "Think about pairs. User: ok";
        assert_eq!(cleaner().clean(raw), "Think about pairs.");
    }

    #[test]
    fn removes_stage_directions() {
        let raw = "(smiles warmly) Nice work! *nods* Now, what about duplicates?";
        assert_eq!(cleaner().clean(raw), "Nice work! Now, what about duplicates?");
    }

    #[test]
    fn keeps_function_calls_and_bold() {
        let raw = "Call len(nums) first. This is **really important** here.";
        assert_eq!(cleaner().clean(raw), raw);
    }

    #[test]
    fn removes_meta_phrases() {
        let raw = "Hmm, let me think... Consider the last element.";
        assert_eq!(cleaner().clean(raw), "Consider the last element.");
    }

    #[test]
    fn collapses_long_blank_runs_only() {
        assert_eq!(cleaner().clean("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(cleaner().clean("a\n\n\nb"), "a\n\n\nb");
        assert_eq!(cleaner().clean("a   \nb\t"), "a\nb");
    }

    #[test]
    fn trailing_colon_removed_at_end_only() {
        assert_eq!(cleaner().clean("Here is a hint:"), "Here is a hint");
        assert_eq!(cleaner().clean("Note: use a set."), "Note: use a set.");
    }

    #[test]
    fn code_blocks_are_untouched() {
        let raw = "Look at this:\n```python\ndef f(x):  \n    (pauses)  # *nods*\n\n\n\n\n    return x:\n```\nWhat does it return?";
        let cleaned = cleaner().clean(raw);
        assert_eq!(extract_code_blocks(&cleaned), extract_code_blocks(raw));
        assert!(cleaned.contains("    (pauses)  # *nods*\n\n\n\n\n    return x:\n"));
        assert!(cleaned.starts_with("Look at this:\n```python\n"));
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let raw = "Try:\n```rust\nfn main() {  \n    // Student: not a label\n";
        let cleaned = cleaner().clean(raw);
        assert!(cleaned.ends_with("// Student: not a label\n"));
        assert_eq!(extract_code_blocks(raw).len(), 1);
        assert_eq!(extract_code_blocks(&cleaned), extract_code_blocks(raw));
    }

    #[test]
    fn trailing_colon_kept_inside_final_code_block() {
        let raw = "```python\nif x:\n```";
        assert_eq!(cleaner().clean(raw), raw);
    }

    #[test]
    fn extract_finds_blocks_in_order() {
        let text = "a\n```\none\n```\nb\n```py\ntwo\n```\n";
        assert_eq!(
            extract_code_blocks(text),
            vec!["```\none\n```".to_string(), "```py\ntwo\n```".to_string()]
        );
    }

    #[test]
    fn fence_opened_mid_line_is_code() {
        let raw = "Try this: ```python\nresult  =  (a  +  b)   \n*x* (pauses)\n```";
        assert_eq!(cleaner().clean(raw), raw);
        assert_eq!(
            extract_code_blocks(raw),
            vec!["```python\nresult  =  (a  +  b)   \n*x* (pauses)\n```".to_string()]
        );
    }

    #[test]
    fn inline_fence_pair_is_code() {
        let raw = "Use ```x  =  1``` (nods)   then loop.";
        assert_eq!(cleaner().clean(raw), "Use ```x  =  1``` then loop.");
    }

    #[test]
    fn response_tags_around_code_are_removed() {
        let raw = "<response>```python\ndef f(a,  b):\n    return a\n```</response>";
        let cleaned = cleaner().clean(raw);
        assert_eq!(cleaned, "```python\ndef f(a,  b):\n    return a\n```");
        assert_eq!(extract_code_blocks(&cleaned), extract_code_blocks(raw));

        let raw = "<think>plan</think></thought>```\nx\n```\nDone.";
        assert_eq!(cleaner().clean(raw), "```\nx\n```\nDone.");
    }

    #[test]
    fn truncation_keeps_later_code_blocks() {
        let raw = "Look. Student: ok\n```\nkeep  me\n```\nAlex: more";
        let cleaned = cleaner().clean(raw);
        assert_eq!(cleaned, "Look. ```\nkeep  me\n```");
        assert_eq!(extract_code_blocks(&cleaned), extract_code_blocks(raw));
    }

    #[test]
    fn cleaning_never_forges_a_fence() {
        // Removing "(pauses)" would join the backticks into a new fence.
        let raw = "a `(pauses)`` b";
        assert_eq!(cleaner().clean(raw), raw);
        assert!(extract_code_blocks(&cleaner().clean(raw)).is_empty());

        // A trailing backtick would merge into the following fence.
        let raw = "see `(nods)```\ncode\n```";
        let cleaned = cleaner().clean(raw);
        assert_eq!(extract_code_blocks(&cleaned), extract_code_blocks(raw));
    }

    #[test]
    fn custom_persona_name_is_a_label() {
        let sam = ResponseCleaner::new("Sam");
        assert_eq!(sam.clean("Sam: Hello!\nSam: again"), "Hello!");
    }

    #[test]
    fn idempotent_on_mixed_inputs() {
        let samples = [
            "",
            ":",
            "  \n\n  ",
            "Alex: (nods) Hmm... ok:  \n\n\n\n\n*thinks deeply* done::",
            "<think>x</think><think>y</think>Alex:Alex: hi",
            "Intro  text (smiles)\n```\ncode  \n```\n\n\n\n\nOutro *waves*:\n```js\nlet a = 1;\n```",
            "Here:\n```\nunclosed\n\n\n\n",
            "Let me see.   Let me think about it: the answer (thinking...) is near.\nStudent: thanks",
            "((nested (pauses) parens))",
            "**  *smiles* **",
            "User:",
        ];
        let c = cleaner();
        for sample in samples {
            let once = c.clean(sample);
            assert_eq!(c.clean(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn code_preserved_when_labels_follow_code() {
        let samples = [
            "Intro (nods)\n```py\n  x = (pauses)\n```\nThen:\nStudent: hi",
            "```\n*a*  \n```\n```\nb\t\n```\nAlex: leaked",
            "text\n   ```\n  indented fence  \n   ```\n",
        ];
        let c = cleaner();
        for sample in samples {
            assert_eq!(
                extract_code_blocks(&c.clean(sample)),
                extract_code_blocks(sample),
                "code changed for {sample:?}"
            );
        }
    }
}
