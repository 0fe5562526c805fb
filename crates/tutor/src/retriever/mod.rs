//! Problem retrieval: free-text request → one concrete problem.
//!
//! The request runs through an ordered cascade of strategies. The first one
//! that yields a candidate wins:
//!
//! 1. **Random**: empty or topic-less requests pick from the random pool
//! 2. **Taxonomy**: dictionary terms map to canonical tags
//! 3. **Keyword**: substring probes over a bounded corpus prefix
//! 4. **Fallback**: random pick with an apology for the miss
//!
//! Every random choice is uniform over its candidates. The only failure is an
//! empty corpus.

pub mod intent;
pub mod strategy;
pub mod taxonomy;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zerotohire_config::RetrieverConfig;
use zerotohire_core::corpus::ProblemCorpus;
use zerotohire_core::error::CorpusError;
use zerotohire_core::problem::Problem;

pub use intent::detect_problem_request;
pub use strategy::{
    Candidate, FallbackStrategy, KeywordStrategy, RandomStrategy, RetrievalStrategy,
    TaxonomyStrategy,
};
pub use taxonomy::NormalizedRequest;

/// Which cascade stage produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Random,
    Taxonomy,
    Keyword,
    Fallback,
}

impl RetrievalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Taxonomy => "taxonomy",
            Self::Keyword => "keyword",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one retrieval.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub problem: Problem,
    pub stage: RetrievalStage,
    /// Opening line for the synthesized intro message
    pub lead: String,
}

/// Runs the retrieval cascade over a shared corpus.
pub struct ProblemRetriever {
    strategies: Vec<Box<dyn RetrievalStrategy>>,
}

impl ProblemRetriever {
    /// The standard four-stage cascade.
    pub fn new(config: &RetrieverConfig) -> Self {
        Self::with_strategies(vec![
            Box::new(RandomStrategy {
                pool_limit: config.random_pool_limit,
            }),
            Box::new(TaxonomyStrategy),
            Box::new(KeywordStrategy {
                scan_limit: config.keyword_scan_limit,
            }),
            Box::new(FallbackStrategy {
                pool_limit: config.random_pool_limit,
            }),
        ])
    }

    /// A custom cascade, tried in order.
    pub fn with_strategies(strategies: Vec<Box<dyn RetrievalStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn stages(&self) -> Vec<RetrievalStage> {
        self.strategies.iter().map(|s| s.stage()).collect()
    }

    /// Map `request` to a problem.
    pub fn retrieve(
        &self,
        request: &str,
        corpus: &dyn ProblemCorpus,
        rng: &mut dyn RngCore,
    ) -> Result<Retrieval, CorpusError> {
        if corpus.is_empty() {
            return Err(CorpusError::Empty);
        }

        let normalized = NormalizedRequest::new(request);
        for strategy in &self.strategies {
            if let Some(candidate) = strategy.select(&normalized, corpus, rng) {
                let stage = strategy.stage();
                tracing::info!(
                    problem_id = %candidate.problem.id,
                    stage = %stage,
                    request = %normalized.raw(),
                    "Problem retrieved"
                );
                return Ok(Retrieval {
                    problem: candidate.problem.clone(),
                    stage,
                    lead: lead_for(stage, &normalized, candidate.topic),
                });
            }
        }

        // Only reachable with a custom cascade that lacks a fallback.
        let problem = corpus.problems().first().ok_or(CorpusError::Empty)?;
        Ok(Retrieval {
            problem: problem.clone(),
            stage: RetrievalStage::Fallback,
            lead: lead_for(RetrievalStage::Fallback, &normalized, None),
        })
    }
}

fn lead_for(stage: RetrievalStage, request: &NormalizedRequest, topic: Option<&str>) -> String {
    match stage {
        RetrievalStage::Random => "Here's a random problem for you to work on!".to_string(),
        RetrievalStage::Taxonomy | RetrievalStage::Keyword => format!(
            "Perfect! I found a {} problem for you. Here's what we'll work on:",
            topic.unwrap_or(request.raw())
        ),
        RetrievalStage::Fallback => format!(
            "I couldn't find a specific problem matching '{}', so I picked this random one for you!",
            request.raw()
        ),
    }
}
