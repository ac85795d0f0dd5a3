//! Player identity reconciliation between the model feed and the exchange.
//!
//! The two catalogs print names differently ("Scheffler, Scott" vs
//! "Scottie Scheffler"), so matching is fuzzy: normalize both sides to
//! "First Last", score with a pluggable similarity strategy, and accept
//! the best candidate at or above a cutoff.

use tracing::debug;

use crate::types::{MarketQuote, MatchedPair, ProbabilityQuote};

/// Default acceptance cutoff for fuzzy matches.
pub const DEFAULT_CUTOFF: f64 = 0.6;

/// Convert "Last, First" to "First Last", trim, and collapse internal
/// whitespace. Names without a comma pass through unchanged apart from
/// whitespace cleanup.
pub fn normalize_name(name: &str) -> String {
    let reordered = match name.split_once(',') {
        Some((last, first)) => format!("{} {}", first.trim(), last.trim()),
        None => name.trim().to_string(),
    };
    reordered.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Similarity strategies
// ---------------------------------------------------------------------------

/// A name similarity scorer. Implementations must be symmetric and
/// return a score in [0, 1], with 1.0 for identical inputs.
pub trait NameSimilarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Character-level similarity derived from edit distance:
/// `1 - levenshtein(a, b) / max(len)`. Case-insensitive.
///
/// This is the default scorer: it tolerates nickname variants
/// ("Scott" vs "Scottie") that word-level scoring misses.
#[derive(Debug, Default, Clone)]
pub struct EditDistanceRatio;

impl NameSimilarity for EditDistanceRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.to_lowercase().chars().collect();
        let b: Vec<char> = b.to_lowercase().chars().collect();

        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let max_len = a.len().max(b.len());
        if max_len == 0 {
            return 1.0;
        }

        1.0 - (levenshtein(&a, &b) as f64 / max_len as f64)
    }
}

/// Word-level similarity: Jaccard overlap of words longer than two
/// characters, blended with a containment bonus. Stricter on spelling
/// variants but robust to word reordering.
#[derive(Debug, Default, Clone)]
pub struct TokenOverlap;

impl NameSimilarity for TokenOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a_lower = a.to_lowercase();
        let b_lower = b.to_lowercase();

        let words_a: std::collections::HashSet<&str> = a_lower
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .collect();
        let words_b: std::collections::HashSet<&str> = b_lower
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .collect();

        if words_a.is_empty() || words_b.is_empty() {
            return 0.0;
        }

        let intersection = words_a.intersection(&words_b).count() as f64;
        let union = words_a.union(&words_b).count() as f64;
        let jaccard = intersection / union;

        let containment = if words_a.is_subset(&words_b) || words_b.is_subset(&words_a) {
            1.0
        } else {
            0.0
        };

        jaccard * 0.6 + containment * 0.4
    }
}

/// Row-by-row Levenshtein distance over two char slices.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Fuzzy name matcher with a fixed cutoff and an injectable scorer.
pub struct NameMatcher {
    cutoff: f64,
    scorer: Box<dyn NameSimilarity>,
}

impl NameMatcher {
    pub fn new(cutoff: f64, scorer: Box<dyn NameSimilarity>) -> Self {
        Self { cutoff, scorer }
    }

    /// The default matcher: edit-distance scoring at the standard cutoff.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CUTOFF, Box::new(EditDistanceRatio))
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Find the best canonical candidate for a raw exchange name.
    ///
    /// Candidates must be pre-sorted: equal scores keep the earlier
    /// candidate, so the result is deterministic for a given input set.
    /// Returns the matched candidate and its score, or None when no
    /// candidate reaches the cutoff.
    pub fn best_match<'a>(&self, raw: &str, candidates: &'a [String]) -> Option<(&'a str, f64)> {
        let target = normalize_name(raw);

        let mut best: Option<(&str, f64)> = None;
        for candidate in candidates {
            let score = self.scorer.score(&target, candidate);
            if score >= self.cutoff && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate.as_str(), score));
            }
        }

        if best.is_none() {
            debug!(raw, target = %target, "No name match above cutoff");
        }
        best
    }

    /// Reconcile a market quote against the probability catalog.
    /// The category must match exactly; only the name is fuzzy.
    pub fn reconcile(
        &self,
        market: &MarketQuote,
        candidates: &[String],
        lookup: impl Fn(&str) -> Option<ProbabilityQuote>,
    ) -> Option<MatchedPair> {
        let (player, similarity) = self.best_match(&market.player_raw, candidates)?;
        let probability = lookup(player)?;
        if probability.category != market.category {
            return None;
        }
        Some(MatchedPair {
            probability,
            market: market.clone(),
            similarity,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
