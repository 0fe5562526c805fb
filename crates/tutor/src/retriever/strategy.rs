//! The four retrieval stages.

use rand::RngCore;
use rand::seq::IndexedRandom;
use zerotohire_core::corpus::ProblemCorpus;
use zerotohire_core::problem::Problem;

use super::RetrievalStage;
use super::taxonomy::NormalizedRequest;

/// A problem picked by one stage, plus what it matched on.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'c> {
    pub problem: &'c Problem,
    /// The topic phrase that matched, if the stage matches on topics
    pub topic: Option<&'static str>,
}

/// One stage of the retrieval cascade.
pub trait RetrievalStrategy: Send + Sync {
    fn stage(&self) -> RetrievalStage;

    /// Pick a problem, or `None` to pass to the next stage.
    fn select<'c>(
        &self,
        request: &NormalizedRequest,
        corpus: &'c dyn ProblemCorpus,
        rng: &mut dyn RngCore,
    ) -> Option<Candidate<'c>>;
}

/// Uniform choice over the first `pool_limit` problems.
fn choose_from_pool<'c>(
    corpus: &'c dyn ProblemCorpus,
    pool_limit: usize,
    rng: &mut dyn RngCore,
) -> Option<&'c Problem> {
    let problems = corpus.problems();
    let pool = &problems[..pool_limit.max(1).min(problems.len())];
    pool.choose(rng)
}

// ── Random ────────────────────────────────────────────────────────────────

/// Empty, "random", or filler-only requests.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    pub pool_limit: usize,
}

impl RetrievalStrategy for RandomStrategy {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Random
    }

    fn select<'c>(
        &self,
        request: &NormalizedRequest,
        corpus: &'c dyn ProblemCorpus,
        rng: &mut dyn RngCore,
    ) -> Option<Candidate<'c>> {
        if !request.is_unspecific() {
            return None;
        }
        choose_from_pool(corpus, self.pool_limit, rng).map(|problem| Candidate {
            problem,
            topic: None,
        })
    }
}

// ── Taxonomy ──────────────────────────────────────────────────────────────

/// Dictionary terms → canonical tags → problems carrying any of those tags.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyStrategy;

impl RetrievalStrategy for TaxonomyStrategy {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Taxonomy
    }

    fn select<'c>(
        &self,
        request: &NormalizedRequest,
        corpus: &'c dyn ProblemCorpus,
        rng: &mut dyn RngCore,
    ) -> Option<Candidate<'c>> {
        let matches = request.taxonomy_matches();
        let (first_term, _) = *matches.first()?;

        let mut tags: Vec<&str> = matches.iter().flat_map(|(_, tags)| tags.iter().copied()).collect();
        tags.sort_unstable();
        tags.dedup();

        let candidates: Vec<&Problem> = corpus
            .problems()
            .iter()
            .filter(|p| tags.iter().any(|tag| p.has_topic(tag)))
            .collect();

        tracing::debug!(
            tags = ?tags,
            candidates = candidates.len(),
            "Taxonomy stage"
        );

        candidates.choose(rng).map(|&problem| Candidate {
            problem,
            topic: Some(first_term),
        })
    }
}

// ── Keyword ───────────────────────────────────────────────────────────────

/// Substring probes over titles and descriptions of a bounded corpus prefix.
#[derive(Debug, Clone)]
pub struct KeywordStrategy {
    pub scan_limit: usize,
}

impl RetrievalStrategy for KeywordStrategy {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Keyword
    }

    fn select<'c>(
        &self,
        request: &NormalizedRequest,
        corpus: &'c dyn ProblemCorpus,
        rng: &mut dyn RngCore,
    ) -> Option<Candidate<'c>> {
        let probes = request.keyword_probes();
        let first = *probes.first()?;

        let candidates: Vec<&Problem> = corpus
            .problems()
            .iter()
            .take(self.scan_limit)
            .filter(|p| {
                let title = p.title.to_lowercase();
                let description = p.description.to_lowercase();
                probes.iter().any(|probe| probe.matches(&title, &description))
            })
            .collect();

        tracing::debug!(
            probes = probes.len(),
            candidates = candidates.len(),
            "Keyword stage"
        );

        candidates.choose(rng).map(|&problem| Candidate {
            problem,
            topic: Some(first.trigger),
        })
    }
}

// ── Fallback ──────────────────────────────────────────────────────────────

/// Always answers when the corpus is non-empty.
#[derive(Debug, Clone)]
pub struct FallbackStrategy {
    pub pool_limit: usize,
}

impl RetrievalStrategy for FallbackStrategy {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Fallback
    }

    fn select<'c>(
        &self,
        _request: &NormalizedRequest,
        corpus: &'c dyn ProblemCorpus,
        rng: &mut dyn RngCore,
    ) -> Option<Candidate<'c>> {
        choose_from_pool(corpus, self.pool_limit, rng).map(|problem| Candidate {
            problem,
            topic: None,
        })
    }
}
