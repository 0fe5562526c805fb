//! Problem reference data.
//!
//! Problems are immutable and shared by reference across sessions. A session
//! only holds an [`ActiveProblemRef`], the small mutable pointer to whichever
//! problem the student is working on.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a problem in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemId(pub u64);

impl std::fmt::Display for ProblemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProblemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ProblemId)
    }
}

/// Problem difficulty. Unrecognised labels map to [`Difficulty::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[default]
    Unknown,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Unknown,
        }
    }
}

impl From<String> for Difficulty {
    fn from(s: String) -> Self {
        Difficulty::parse(&s)
    }
}

impl From<Difficulty> for String {
    fn from(d: Difficulty) -> Self {
        d.as_str().to_string()
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coding problem from the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Canonical taxonomy tags (e.g. "Array", "Dynamic Programming")
    #[serde(default)]
    pub topics: BTreeSet<String>,
}

impl Problem {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id: ProblemId(id),
            title: title.into(),
            description: String::new(),
            difficulty: Difficulty::Unknown,
            topics: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.insert(topic.into());
        self
    }

    /// Case-insensitive check against the problem's taxonomy tags.
    pub fn has_topic(&self, tag: &str) -> bool {
        self.topics.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// The pointer a session holds to its active problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveProblemRef {
    pub id: ProblemId,
    pub title: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl From<&Problem> for ActiveProblemRef {
    fn from(problem: &Problem) -> Self {
        Self {
            id: problem.id,
            title: problem.title.clone(),
            difficulty: problem.difficulty,
        }
    }
}
