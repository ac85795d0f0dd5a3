//! Opportunity gating.
//!
//! A matched pair becomes an `Opportunity` only after clearing, in order:
//! liquidity, minimum edge, maximum spread, and the stale-price guard.
//! Rejections are typed so the engine can log and audit each reason.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use super::edge::EdgeEval;
use crate::types::{LeaderboardEntry, MatchedPair, Opportunity};

/// Ask price at which a position-threshold market is considered already
/// repriced by the exchange. Below this in a late round, a player sitting
/// inside the threshold means the quote is likely stale.
const STALE_PRICE_ASK_CEILING: f64 = 70.0;

/// Filter thresholds. Defaults match live operation.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Minimum signed edge in percentage points.
    pub min_edge_pct: f64,
    /// Maximum bid/ask spread in cents.
    pub max_spread: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_edge_pct: 8.0,
            max_spread: 15.0,
        }
    }
}

/// Why a matched pair did not become an opportunity.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NoLiquidity,
    EdgeBelowThreshold {
        edge_pct: f64,
        min_edge_pct: f64,
    },
    /// Carries the literal quote so the audit trail shows exactly what
    /// the book looked like.
    SpreadTooWide {
        spread: f64,
        yes_bid: f64,
        yes_ask: f64,
        max_spread: f64,
    },
    /// Player already inside the finishing threshold late in the
    /// tournament, but the ask hasn't repriced.
    StalePrice {
        position: u32,
        threshold: u32,
        yes_ask: f64,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoLiquidity => write!(f, "no liquidity (yes_bid = 0)"),
            RejectReason::EdgeBelowThreshold { edge_pct, min_edge_pct } => {
                write!(f, "edge {edge_pct:.1}% below minimum {min_edge_pct:.1}%")
            }
            RejectReason::SpreadTooWide { spread, yes_bid, yes_ask, max_spread } => {
                write!(
                    f,
                    "spread {spread:.0}¢ (bid {yes_bid:.0}¢ / ask {yes_ask:.0}¢) exceeds {max_spread:.0}¢"
                )
            }
            RejectReason::StalePrice { position, threshold, yes_ask } => {
                write!(
                    f,
                    "stale price: pos {position} inside top-{threshold} but ask only {yes_ask:.0}¢"
                )
            }
        }
    }
}

/// Stateless opportunity filter. Pure and idempotent: the same pair and
/// thresholds always produce the same result, and nothing downstream is
/// ever invoked from here.
pub struct OpportunityFilter {
    config: FilterConfig,
}

impl OpportunityFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Run the ordered gates. `min_edge_pct` is passed per call because
    /// the round schedule adjusts it each cycle.
    pub fn check(
        &self,
        pair: &MatchedPair,
        eval: &EdgeEval,
        min_edge_pct: f64,
        standing: Option<&LeaderboardEntry>,
        now: DateTime<Utc>,
    ) -> Result<Opportunity, RejectReason> {
        // Discovery already excludes zero-bid markets; re-check the
        // invariant here so filter correctness never depends on it.
        if pair.market.yes_bid <= 0.0 {
            return Err(RejectReason::NoLiquidity);
        }

        if eval.edge_pct < min_edge_pct {
            return Err(RejectReason::EdgeBelowThreshold {
                edge_pct: eval.edge_pct,
                min_edge_pct,
            });
        }

        if eval.spread > self.config.max_spread {
            return Err(RejectReason::SpreadTooWide {
                spread: eval.spread,
                yes_bid: pair.market.yes_bid,
                yes_ask: pair.market.yes_ask,
                max_spread: self.config.max_spread,
            });
        }

        if let Some(reason) = stale_price_guard(pair, standing) {
            return Err(reason);
        }

        Ok(Opportunity {
            id: Uuid::new_v4(),
            ticker: pair.market.ticker.clone(),
            player: pair.probability.player.clone(),
            category: pair.market.category,
            model_prob: pair.probability.probability,
            implied_prob: eval.implied_probability,
            edge_pct: eval.edge_pct,
            spread: eval.spread,
            detected_at: now,
        })
    }
}

/// Reject position-threshold markets (top 5/10/20) where the player is
/// already inside the threshold in round 3 or later but the ask is still
/// cheap. The model has seen the scores; the book hasn't.
fn stale_price_guard(pair: &MatchedPair, standing: Option<&LeaderboardEntry>) -> Option<RejectReason> {
    let threshold = pair.market.category.finishing_threshold()?;
    let entry = standing?;

    if entry.round_number >= 3
        && entry.position <= threshold
        && pair.market.yes_ask < STALE_PRICE_ASK_CEILING
    {
        return Some(RejectReason::StalePrice {
            position: entry.position,
            threshold,
            yes_ask: pair.market.yes_ask,
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
