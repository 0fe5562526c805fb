//! Problem corpus: a read-only view over the problem set.
//!
//! The corpus is loaded once and shared by reference (`Arc<dyn ProblemCorpus>`)
//! across every session; nothing in the engine mutates it, so no locking is
//! needed.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CorpusError;
use crate::problem::{Difficulty, Problem, ProblemId};

/// Distinct values available for filtering the corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub difficulties: Vec<Difficulty>,
    pub topics: Vec<String>,
}

/// Read-only access to the problem set.
pub trait ProblemCorpus: Send + Sync {
    /// All problems, in corpus order. Order is stable for the corpus lifetime.
    fn problems(&self) -> &[Problem];

    /// Look up a problem by ID.
    fn get(&self, id: ProblemId) -> Option<&Problem> {
        self.problems().iter().find(|p| p.id == id)
    }

    fn len(&self) -> usize {
        self.problems().len()
    }

    fn is_empty(&self) -> bool {
        self.problems().is_empty()
    }

    /// Sorted, de-duplicated difficulties and topics present in the corpus.
    fn filter_options(&self) -> FilterOptions {
        let mut difficulties = BTreeSet::new();
        let mut topics = BTreeSet::new();
        for problem in self.problems() {
            difficulties.insert(problem.difficulty);
            topics.extend(problem.topics.iter().cloned());
        }
        FilterOptions {
            difficulties: difficulties.into_iter().collect(),
            topics: topics.into_iter().collect(),
        }
    }
}

/// A corpus held entirely in memory with an ID index.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    problems: Vec<Problem>,
    index: HashMap<ProblemId, usize>,
}

impl InMemoryCorpus {
    /// Build a corpus from problems. Duplicate IDs are rejected.
    pub fn new(problems: Vec<Problem>) -> std::result::Result<Self, CorpusError> {
        let mut index = HashMap::with_capacity(problems.len());
        for (pos, problem) in problems.iter().enumerate() {
            if index.insert(problem.id, pos).is_some() {
                return Err(CorpusError::Parse(format!(
                    "duplicate problem id {}",
                    problem.id
                )));
            }
        }
        Ok(Self { problems, index })
    }

    /// Parse a JSON array of problems.
    ///
    /// Accepts `description` or `content` for the statement, and `topics`
    /// as either a list or a comma-separated string (`problem_types`).
    /// Problems without an `id` are numbered by position, starting at 1.
    pub fn from_json_str(json: &str) -> std::result::Result<Self, CorpusError> {
        let raw: Vec<RawProblem> =
            serde_json::from_str(json).map_err(|e| CorpusError::Parse(e.to_string()))?;

        let problems = raw
            .into_iter()
            .enumerate()
            .map(|(pos, r)| r.into_problem(pos as u64 + 1))
            .collect();

        Self::new(problems)
    }

    /// Load a corpus from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> std::result::Result<Self, CorpusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CorpusError::Load(format!("{}: {e}", path.display())))?;
        let corpus = Self::from_json_str(&content)?;
        tracing::info!(path = %path.display(), problems = corpus.len(), "Loaded problem corpus");
        Ok(corpus)
    }
}

impl ProblemCorpus for InMemoryCorpus {
    fn problems(&self) -> &[Problem] {
        &self.problems
    }

    fn get(&self, id: ProblemId) -> Option<&Problem> {
        self.index.get(&id).and_then(|&pos| self.problems.get(pos))
    }
}

// ── Wire format ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawProblem {
    #[serde(default)]
    id: Option<u64>,
    title: String,
    #[serde(default, alias = "content")]
    description: String,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default, alias = "problem_types", alias = "tags")]
    topics: Option<TopicList>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TopicList {
    List(Vec<String>),
    Joined(String),
}

impl RawProblem {
    fn into_problem(self, fallback_id: u64) -> Problem {
        let topics = match self.topics {
            Some(TopicList::List(list)) => list,
            Some(TopicList::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
            None => Vec::new(),
        };

        Problem {
            id: ProblemId(self.id.unwrap_or(fallback_id)),
            title: self.title.trim().to_string(),
            description: self.description,
            difficulty: self
                .difficulty
                .as_deref()
                .map(Difficulty::parse)
                .unwrap_or_default(),
            topics: topics
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}
