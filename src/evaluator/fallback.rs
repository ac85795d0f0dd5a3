//! Deterministic rule-based evaluator.
//!
//! Used as the primary evaluator when no LLM key is configured, and as
//! the fallback whenever the remote evaluator errors. Conservative by
//! construction: big edges get a small BET, everything else is WATCH.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{EvaluationContext, Evaluator};
use crate::types::{Decision, Opportunity, Verdict};

/// Edge at which the rule bets without asking anyone.
const STRONG_EDGE_PCT: f64 = 15.0;

#[derive(Debug, Default, Clone)]
pub struct RuleBasedEvaluator;

#[async_trait]
impl Evaluator for RuleBasedEvaluator {
    async fn decide(
        &self,
        opportunity: &Opportunity,
        _context: &EvaluationContext,
    ) -> Result<Decision> {
        let decision = if opportunity.edge_pct >= STRONG_EDGE_PCT {
            Decision {
                verdict: Verdict::Bet,
                confidence: 0.5,
                suggested_stake_pct: 1.0,
                reasoning: format!(
                    "Rule: edge {:+.1}% exceeds {STRONG_EDGE_PCT:.0}% auto-bet threshold",
                    opportunity.edge_pct
                ),
            }
        } else {
            Decision {
                verdict: Verdict::Watch,
                confidence: 0.3,
                suggested_stake_pct: 0.0,
                reasoning: format!(
                    "Rule: edge {:+.1}% below {STRONG_EDGE_PCT:.0}% auto-bet threshold",
                    opportunity.edge_pct
                ),
            }
        };

        debug!(
            ticker = %opportunity.ticker,
            verdict = %decision.verdict,
            "Rule-based decision"
        );
        Ok(decision)
    }

    fn name(&self) -> &str {
        "rule-based"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
