//! Static vocabulary: what students type → canonical topic tags and
//! substring probes.

/// User-facing terms and the canonical tags they stand for.
///
/// Terms are matched as whole-word phrases against the normalised request,
/// so `"dp"` matches "give me a dp problem" but not "dpkg".
pub const TAXONOMY: &[(&str, &[&str])] = &[
    ("array", &["Array"]),
    ("arrays", &["Array"]),
    ("string", &["String"]),
    ("strings", &["String"]),
    ("tree", &["Tree", "Binary Tree", "Binary Search Tree"]),
    ("trees", &["Tree", "Binary Tree", "Binary Search Tree"]),
    ("binary tree", &["Binary Tree"]),
    ("bst", &["Binary Search Tree"]),
    ("binary search tree", &["Binary Search Tree"]),
    ("linked list", &["Linked List"]),
    ("linked lists", &["Linked List"]),
    ("graph", &["Graph", "Breadth-First Search", "Depth-First Search"]),
    ("graphs", &["Graph", "Breadth-First Search", "Depth-First Search"]),
    ("bfs", &["Breadth-First Search"]),
    ("breadth first search", &["Breadth-First Search"]),
    ("dfs", &["Depth-First Search"]),
    ("depth first search", &["Depth-First Search"]),
    ("dp", &["Dynamic Programming"]),
    ("dynamic programming", &["Dynamic Programming"]),
    ("memoization", &["Memoization", "Dynamic Programming"]),
    ("sort", &["Sorting"]),
    ("sorting", &["Sorting"]),
    ("binary search", &["Binary Search"]),
    ("two pointer", &["Two Pointers"]),
    ("two pointers", &["Two Pointers"]),
    ("sliding window", &["Sliding Window"]),
    ("hash", &["Hash Table"]),
    ("hashing", &["Hash Table"]),
    ("hash table", &["Hash Table"]),
    ("hash tables", &["Hash Table"]),
    ("hash map", &["Hash Table"]),
    ("hashmap", &["Hash Table"]),
    ("stack", &["Stack", "Monotonic Stack"]),
    ("stacks", &["Stack", "Monotonic Stack"]),
    ("queue", &["Queue", "Monotonic Queue"]),
    ("queues", &["Queue", "Monotonic Queue"]),
    ("heap", &["Heap (Priority Queue)"]),
    ("priority queue", &["Heap (Priority Queue)"]),
    ("greedy", &["Greedy"]),
    ("backtracking", &["Backtracking"]),
    ("recursion", &["Recursion"]),
    ("math", &["Math"]),
    ("bit manipulation", &["Bit Manipulation"]),
    ("matrix", &["Matrix"]),
    ("trie", &["Trie"]),
    ("union find", &["Union Find"]),
    ("prefix sum", &["Prefix Sum"]),
];

/// A category the keyword stage can probe for.
#[derive(Debug, Clone, Copy)]
pub struct KeywordProbe {
    /// Substring of the request that activates this probe
    pub trigger: &'static str,
    /// Substrings looked for in the lowercased title
    pub in_title: &'static [&'static str],
    /// Substrings looked for in the lowercased description
    pub in_description: &'static [&'static str],
}

impl KeywordProbe {
    pub fn matches(&self, title_lower: &str, description_lower: &str) -> bool {
        self.in_title.iter().any(|p| title_lower.contains(p))
            || self.in_description.iter().any(|p| description_lower.contains(p))
    }
}

pub const KEYWORD_PROBES: &[KeywordProbe] = &[
    KeywordProbe { trigger: "array", in_title: &["array"], in_description: &["array"] },
    KeywordProbe { trigger: "string", in_title: &["string"], in_description: &["string"] },
    KeywordProbe { trigger: "tree", in_title: &["tree"], in_description: &["binary tree"] },
    KeywordProbe { trigger: "linked list", in_title: &["linked list"], in_description: &["listnode"] },
    KeywordProbe { trigger: "graph", in_title: &["graph"], in_description: &["graph"] },
    KeywordProbe { trigger: "dynamic programming", in_title: &[], in_description: &["dynamic", "dp"] },
    KeywordProbe { trigger: "sort", in_title: &["sort"], in_description: &["sort"] },
    KeywordProbe { trigger: "binary search", in_title: &["binary search"], in_description: &["binary search"] },
    KeywordProbe { trigger: "two pointer", in_title: &["pointer"], in_description: &["two pointer"] },
    KeywordProbe { trigger: "sliding window", in_title: &["window"], in_description: &["sliding window"] },
    KeywordProbe { trigger: "hash", in_title: &["hash"], in_description: &["hash"] },
    KeywordProbe { trigger: "stack", in_title: &["stack"], in_description: &["stack"] },
    KeywordProbe { trigger: "queue", in_title: &["queue"], in_description: &["queue"] },
];

/// Words that carry no topic: "give me a new problem" is a random request.
pub const FILLER_WORDS: &[&str] = &[
    "a", "an", "another", "any", "can", "different", "find", "for", "get", "give", "i",
    "just", "me", "new", "next", "one", "please", "problem", "problems", "question",
    "questions", "random", "show", "some", "the", "to", "want", "need", "work", "on",
    "you", "something", "let", "lets", "s", "pick",
];

/// A request reduced to lowercase alphanumeric words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    raw: String,
    lower: String,
    words: Vec<String>,
}

impl NormalizedRequest {
    pub fn new(request: &str) -> Self {
        let raw = request.trim().to_string();
        let lower = raw.to_lowercase();
        let words = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self { raw, lower, words }
    }

    /// The request as typed, trimmed.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Whether the request names nothing beyond filler words.
    pub fn is_unspecific(&self) -> bool {
        self.words
            .iter()
            .all(|w| FILLER_WORDS.contains(&w.as_str()))
    }

    /// Whole-word phrase match.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        let phrase_words: Vec<&str> = phrase.split(' ').collect();
        if phrase_words.is_empty() || phrase_words.len() > self.words.len() {
            return false;
        }
        self.words
            .windows(phrase_words.len())
            .any(|window| window.iter().zip(&phrase_words).all(|(a, b)| a == b))
    }

    /// Terms and their tags found in this request, in dictionary order.
    pub fn taxonomy_matches(&self) -> Vec<(&'static str, &'static [&'static str])> {
        TAXONOMY
            .iter()
            .filter(|(term, _)| self.contains_phrase(term))
            .copied()
            .collect()
    }

    pub fn keyword_probes(&self) -> Vec<&'static KeywordProbe> {
        KEYWORD_PROBES
            .iter()
            .filter(|p| self.lower.contains(p.trigger))
            .collect()
    }
}
