//! Kelly criterion stake sizing.
//!
//! Quarter-Kelly with a hard cap, computed from the model probability
//! and the cents-denominated entry price. Sizing is advisory: the
//! evaluator's suggested stake is overridden only when Kelly says the
//! bet is positive expected value.

use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub fraction: f64,
    /// Maximum stake as a fraction of bankroll.
    pub max_stake_pct: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            fraction: 0.25,
            max_stake_pct: 0.05,
        }
    }
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Advisory stake for one opportunity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StakeRecommendation {
    /// Recommended stake as a percentage of bankroll (0–100 scale).
    pub stake_pct: f64,
    /// Probability at which the bet breaks even (the entry price).
    pub breakeven_prob: f64,
    /// Model probability minus breakeven, as a fraction.
    pub edge_over_breakeven: f64,
    pub is_positive_ev: bool,
}

/// Raw fractional-Kelly stake as a fraction of bankroll.
///
/// f* = (bp - q) / b with b = (100 - price) / price, then multiplied by
/// the Kelly fraction and capped. Returns 0.0 when the bet is not
/// positive expected value or the price is degenerate.
pub fn kelly_stake(model_prob: f64, entry_price_cents: f64, config: &KellyConfig) -> f64 {
    if entry_price_cents <= 0.0 || entry_price_cents >= 100.0 {
        return 0.0;
    }

    let b = (100.0 - entry_price_cents) / entry_price_cents;
    let q = 1.0 - model_prob;
    let kelly = (b * model_prob - q) / b;

    if kelly <= 0.0 {
        debug!(model_prob, entry_price_cents, kelly, "Negative Kelly, no stake");
        return 0.0;
    }

    (kelly * config.fraction).min(config.max_stake_pct)
}

/// Full recommendation including the breakeven context the evaluator
/// prompt reports.
pub fn recommend(model_prob: f64, entry_price_cents: f64, config: &KellyConfig) -> StakeRecommendation {
    let breakeven = entry_price_cents / 100.0;
    let edge_over = model_prob - breakeven;
    let stake_fraction = kelly_stake(model_prob, entry_price_cents, config);

    StakeRecommendation {
        stake_pct: stake_fraction * 100.0,
        breakeven_prob: breakeven,
        edge_over_breakeven: edge_over,
        is_positive_ev: stake_fraction > 0.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_edge_positive_stake() {
        // Model 34% vs 22¢ entry: clear positive EV
        let stake = kelly_stake(0.34, 22.0, &KellyConfig::default());
        assert!(stake > 0.0);
        assert!(stake <= 0.05);
    }

    #[test]
    fn test_negative_edge_no_stake() {
        let stake = kelly_stake(0.15, 22.0, &KellyConfig::default());
        assert_eq!(stake, 0.0);
    }

    #[test]
    fn test_breakeven_no_stake() {
        // Model exactly at price → zero Kelly
        let stake = kelly_stake(0.22, 22.0, &KellyConfig::default());
        assert!(stake.abs() < 1e-12);
    }

    #[test]
    fn test_cap_applies() {
        // Huge edge would exceed the cap without clamping
        let stake = kelly_stake(0.90, 20.0, &KellyConfig::default());
        assert!((stake - 0.05).abs() < 1e-10);
    }

    #[test]
    fn test_quarter_kelly_math() {
        // price 50¢ → b = 1; model 0.60 → raw kelly = (0.6 - 0.4) / 1 = 0.2
        // quarter-Kelly = 0.05, exactly at the cap
        let stake = kelly_stake(0.60, 50.0, &KellyConfig::default());
        assert!((stake - 0.05).abs() < 1e-10);

        // model 0.55 → raw 0.10 → quarter 0.025, under the cap
        let stake = kelly_stake(0.55, 50.0, &KellyConfig::default());
        assert!((stake - 0.025).abs() < 1e-10);
    }

    #[test]
    fn test_degenerate_prices() {
        let cfg = KellyConfig::default();
        assert_eq!(kelly_stake(0.50, 0.0, &cfg), 0.0);
        assert_eq!(kelly_stake(0.99, 100.0, &cfg), 0.0);
        assert_eq!(kelly_stake(0.50, -5.0, &cfg), 0.0);
    }

    #[test]
    fn test_recommend_fields() {
        let rec = recommend(0.34, 22.0, &KellyConfig::default());
        assert!((rec.breakeven_prob - 0.22).abs() < 1e-10);
        assert!((rec.edge_over_breakeven - 0.12).abs() < 1e-10);
        assert!(rec.is_positive_ev);
        assert!(rec.stake_pct > 0.0 && rec.stake_pct <= 5.0);
    }

    #[test]
    fn test_recommend_negative_ev() {
        let rec = recommend(0.10, 22.0, &KellyConfig::default());
        assert!(!rec.is_positive_ev);
        assert_eq!(rec.stake_pct, 0.0);
        assert!(rec.edge_over_breakeven < 0.0);
    }
}
