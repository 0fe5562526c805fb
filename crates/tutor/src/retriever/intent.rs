//! Recognising "give me another problem" inside a chat message.
//!
//! Matching is narrow: "explain this array problem" stays a normal chat turn.

const REQUEST_PHRASES: &[&str] = &[
    "new problem",
    "different problem",
    "another problem",
    "next problem",
    "random problem",
    "give me a problem",
    "give me an array problem",
    "give me a string problem",
    "give me a tree problem",
    "give me a linked list problem",
    "give me a graph problem",
    "give me a dynamic programming problem",
    "give me a dp problem",
    "give me a sorting problem",
    "give me a binary search problem",
    "give me a hash problem",
    "give me a stack problem",
    "give me a queue problem",
];

const ASKING_PHRASES: &[&str] = &[
    "can i get",
    "can you give me",
    "i want a",
    "i need a",
    "show me a",
    "find me a",
];

/// Topic labels in priority order: first match wins.
const TOPICS: &[(&[&str], &str)] = &[
    (&["array"], "arrays"),
    (&["string"], "strings"),
    (&["tree"], "trees"),
    (&["linked list"], "linked lists"),
    (&["graph"], "graphs"),
    (&["dynamic programming", " dp "], "dynamic programming"),
    (&["sort"], "sorting"),
    (&["binary search"], "binary search"),
    (&["two pointer"], "two pointers"),
    (&["sliding window"], "sliding window"),
    (&["hash"], "hash tables"),
    (&["stack"], "stacks"),
    (&["queue"], "queues"),
];

/// If `message` asks for a problem, the retrieval request it implies.
///
/// Returns `Some("")` for a random problem, `Some(topic)` for a topical one,
/// and `None` for ordinary chat.
pub fn detect_problem_request(message: &str) -> Option<String> {
    let lower = format!(" {} ", message.to_lowercase());

    let is_request = REQUEST_PHRASES.iter().any(|p| lower.contains(p))
        || (ASKING_PHRASES.iter().any(|p| lower.contains(p))
            && (lower.contains("problem") || lower.contains("question")));

    if !is_request {
        return None;
    }

    if lower.contains("random") || lower.contains("give me a problem") {
        return Some(String::new());
    }

    let topic = TOPICS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_default();

    Some(topic)
}
