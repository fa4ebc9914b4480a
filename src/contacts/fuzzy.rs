//! Fuzzy name matching.
//
// Names are compared with a token-order independent ratio so that
// "Smith, John" and "John Smith" score the same. A plain substring scorer is
// available for deployments that want predictable, coarse matching.

use rapidfuzz::distance::indel;
use serde::{Deserialize, Serialize};

use super::{Contact, ContactRecord, ContactSource};

/// Minimum score for a candidate to be listed as a near match.
pub const FUZZY_MATCH_THRESHOLD: u8 = 70;
/// Minimum score for resolving a name without asking the user.
pub const CONFIDENT_MATCH_THRESHOLD: u8 = 90;
/// Score given by [`SubstringContainment`]: above the listing threshold, below an exact match.
pub const SUBSTRING_MATCH_SCORE: u8 = 80;
pub const DEFAULT_MATCH_LIMIT: usize = 5;

/// Similarity between a query and a candidate name, 0-100.
pub trait Scorer: Send + Sync {
    fn score(&self, query: &str, candidate: &str) -> u8;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    #[default]
    TokenSort,
    Substring,
}

impl MatchStrategy {
    pub fn scorer(self) -> Box<dyn Scorer> {
        match self {
            MatchStrategy::TokenSort => Box::new(TokenSortRatio),
            MatchStrategy::Substring => Box::new(SubstringContainment),
        }
    }
}

/// Lowercase, strip punctuation, sort the words, then compare with an indel ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSortRatio;

impl Scorer for TokenSortRatio {
    fn score(&self, query: &str, candidate: &str) -> u8 {
        let a = sorted_tokens(query);
        let b = sorted_tokens(candidate);
        if a.is_empty() || b.is_empty() {
            return 0;
        }
        (indel::normalized_similarity(a.chars(), b.chars()) * 100.0).round() as u8
    }

    fn name(&self) -> &'static str {
        "token_sort"
    }
}

/// Case-insensitive containment in either direction, scored at a fixed value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringContainment;

impl Scorer for SubstringContainment {
    fn score(&self, query: &str, candidate: &str) -> u8 {
        let query = query.trim().to_lowercase();
        let candidate = candidate.trim().to_lowercase();
        if query.is_empty() || candidate.is_empty() {
            return 0;
        }
        if candidate.contains(&query) || query.contains(&candidate) {
            SUBSTRING_MATCH_SCORE
        } else {
            0
        }
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

fn sorted_tokens(input: &str) -> String {
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Ranks candidate contacts by name similarity.
pub struct FuzzyMatcher {
    scorer: Box<dyn Scorer>,
    threshold: u8,
    limit: usize,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(MatchStrategy::default())
    }
}

impl FuzzyMatcher {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self::with_scorer(strategy.scorer())
    }

    pub fn with_scorer(scorer: Box<dyn Scorer>) -> Self {
        Self { scorer, threshold: FUZZY_MATCH_THRESHOLD, limit: DEFAULT_MATCH_LIMIT }
    }

    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    pub fn score(&self, query: &str, candidate: &str) -> u8 {
        self.scorer.score(query, candidate)
    }

    /// Candidates scoring at least the threshold, best first.
    ///
    /// Equal scores keep their original order. Each result carries its score
    /// and its position in `candidates` as `id`.
    pub fn rank(&self, query: &str, candidates: &[ContactRecord]) -> Vec<Contact> {
        let mut matches: Vec<Contact> = candidates
            .iter()
            .enumerate()
            .filter_map(|(id, record)| {
                let score = self.scorer.score(query, &record.name);
                (score >= self.threshold).then(|| {
                    Contact::new(record.name.clone(), record.email.clone(), ContactSource::FuzzyFallback)
                        .with_score(score)
                        .with_id(id)
                })
            })
            .collect();
        // sort_by is stable, ties stay in candidate order
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(self.limit);
        matches
    }
}
