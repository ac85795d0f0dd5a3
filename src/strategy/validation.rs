//! Cross-book edge validation.
//!
//! A model-vs-exchange edge is more trustworthy when independent
//! sportsbooks agree the exchange is cheap. Pinnacle is the sharpest
//! reference; the consensus of all available books is the second signal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How strongly the books corroborate the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationConfidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for ValidationConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationConfidence::High => write!(f, "HIGH"),
            ValidationConfidence::Medium => write!(f, "MEDIUM"),
            ValidationConfidence::Low => write!(f, "LOW"),
        }
    }
}

/// Result of checking an edge against sportsbook prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeValidation {
    /// Edge vs the exchange ask, percentage points.
    pub edge_vs_market: f64,
    /// Edge vs Pinnacle's implied probability, if Pinnacle quotes the player.
    pub edge_vs_pinnacle: Option<f64>,
    /// Edge vs the average of all books, if any quote the player.
    pub edge_vs_consensus: Option<f64>,
    pub confidence: ValidationConfidence,
    pub books_available: usize,
}

/// Validate a model edge against per-book implied probabilities
/// (`book name → implied probability`, fractions).
///
/// HIGH: Pinnacle agrees by at least 3 points and the market edge is at
/// least 8. LOW: Pinnacle or the consensus disagrees with the direction.
/// MEDIUM: everything else, including no book coverage at all.
pub fn validate_edge(
    model_prob: f64,
    market_implied: f64,
    book_probs: &HashMap<String, f64>,
) -> EdgeValidation {
    let edge_vs_market = (model_prob - market_implied) * 100.0;

    let edge_vs_pinnacle = book_probs
        .get("pinnacle")
        .map(|p| (model_prob - p) * 100.0);

    let edge_vs_consensus = if book_probs.is_empty() {
        None
    } else {
        let avg = book_probs.values().sum::<f64>() / book_probs.len() as f64;
        Some((model_prob - avg) * 100.0)
    };

    let confidence = match (edge_vs_pinnacle, edge_vs_consensus) {
        (Some(p), _) if p >= 3.0 && edge_vs_market >= 8.0 => ValidationConfidence::High,
        (Some(p), _) if p < 0.0 => ValidationConfidence::Low,
        (_, Some(c)) if c < 0.0 => ValidationConfidence::Low,
        _ => ValidationConfidence::Medium,
    };

    EdgeValidation {
        edge_vs_market,
        edge_vs_pinnacle,
        edge_vs_consensus,
        confidence,
        books_available: book_probs.len(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn books(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_high_confidence_pinnacle_agrees() {
        // Model 0.34, market 0.22 (edge 12), pinnacle 0.28 (edge 6)
        let v = validate_edge(0.34, 0.22, &books(&[("pinnacle", 0.28), ("draftkings", 0.30)]));
        assert_eq!(v.confidence, ValidationConfidence::High);
        assert!((v.edge_vs_market - 12.0).abs() < 1e-9);
        assert!((v.edge_vs_pinnacle.unwrap() - 6.0).abs() < 1e-9);
        assert_eq!(v.books_available, 2);
    }

    #[test]
    fn test_low_confidence_pinnacle_disagrees() {
        // Pinnacle prices the player above the model
        let v = validate_edge(0.34, 0.22, &books(&[("pinnacle", 0.40)]));
        assert_eq!(v.confidence, ValidationConfidence::Low);
        assert!(v.edge_vs_pinnacle.unwrap() < 0.0);
    }

    #[test]
    fn test_low_confidence_consensus_disagrees() {
        // No pinnacle; the two books average above the model
        let v = validate_edge(0.30, 0.22, &books(&[("fanduel", 0.35), ("bet365", 0.33)]));
        assert_eq!(v.confidence, ValidationConfidence::Low);
        assert!(v.edge_vs_consensus.unwrap() < 0.0);
    }

    #[test]
    fn test_medium_when_no_books() {
        let v = validate_edge(0.34, 0.22, &HashMap::new());
        assert_eq!(v.confidence, ValidationConfidence::Medium);
        assert!(v.edge_vs_pinnacle.is_none());
        assert!(v.edge_vs_consensus.is_none());
        assert_eq!(v.books_available, 0);
    }

    #[test]
    fn test_medium_pinnacle_mild_agreement() {
        // Pinnacle agrees but by under 3 points → not enough for HIGH
        let v = validate_edge(0.34, 0.22, &books(&[("pinnacle", 0.32)]));
        assert_eq!(v.confidence, ValidationConfidence::Medium);
    }

    #[test]
    fn test_high_requires_market_edge_too() {
        // Pinnacle agrees strongly but market edge is only 5
        let v = validate_edge(0.27, 0.22, &books(&[("pinnacle", 0.22)]));
        assert_eq!(v.confidence, ValidationConfidence::Medium);
    }
}
