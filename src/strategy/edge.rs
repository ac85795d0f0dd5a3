//! Edge arithmetic: model probability vs market implied probability.
//!
//! All edge math lives here so every module reports the same numbers.
//! Implied probability always comes from the ask (the price actually
//! payable), never the midpoint.

use crate::types::MarketQuote;

/// Round-based minimum-edge multipliers. Early rounds demand more edge
/// (divide by a smaller multiplier); late rounds relax the bar because
/// live model probabilities sharpen as holes run out.
const ROUND_MULTIPLIERS: [(u32, f64); 4] = [(1, 0.70), (2, 0.85), (3, 1.00), (4, 1.15)];

/// The computed pricing comparison for one matched pair.
#[derive(Debug, Clone, Copy)]
pub struct EdgeEval {
    /// Market implied probability, fraction in [0, 1].
    pub implied_probability: f64,
    /// Signed edge in percentage points. Positive = model above market.
    pub edge_pct: f64,
    /// Bid/ask spread in cents.
    pub spread: f64,
}

/// Compare a model probability (fraction) against a market quote.
pub fn evaluate(model_probability: f64, market: &MarketQuote) -> EdgeEval {
    let implied = market.implied_probability();
    EdgeEval {
        implied_probability: implied,
        edge_pct: (model_probability - implied) * 100.0,
        spread: market.spread(),
    }
}

/// Minimum edge required for the given round. Unknown rounds (0, 5+)
/// use the base threshold unchanged.
pub fn min_edge_for_round(base_min_edge: f64, round: u32) -> f64 {
    let multiplier = ROUND_MULTIPLIERS
        .iter()
        .find(|(r, _)| *r == round)
        .map(|(_, m)| *m)
        .unwrap_or(1.0);
    base_min_edge / multiplier
}

/// Shift evaluator confidence by round: cautious early, assertive in R4.
/// Result is clamped to [0, 1].
pub fn adjust_confidence_for_round(confidence: f64, round: u32) -> f64 {
    let shift = match round {
        1 => -0.10,
        2 => -0.05,
        4 => 0.10,
        _ => 0.0,
    };
    (confidence + shift).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
