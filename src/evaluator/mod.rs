//! Opportunity evaluation.
//!
//! The engine hands every filtered opportunity to an `Evaluator` for the
//! final BET/PASS/WATCH call. The production evaluator is an LLM; the
//! rule-based evaluator doubles as the deterministic fallback when the
//! remote call fails.

pub mod anthropic;
pub mod fallback;

use anyhow::Result;
use async_trait::async_trait;

use crate::strategy::{EdgeValidation, StakeRecommendation};
use crate::types::{Decision, LeaderboardEntry, Opportunity};

/// Everything the evaluator may consider beyond the opportunity itself.
/// All fields are optional: a missing leaderboard or book feed degrades
/// the prompt, never the cycle.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub leaderboard: Option<LeaderboardEntry>,
    pub validation: Option<EdgeValidation>,
    pub stake: Option<StakeRecommendation>,
    /// Current tournament round (1–4), 0 when unknown.
    pub round: u32,
}

/// Capability trait for opportunity evaluators.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Decide what to do with one opportunity.
    async fn decide(&self, opportunity: &Opportunity, context: &EvaluationContext)
        -> Result<Decision>;

    /// Short evaluator name for logging.
    fn name(&self) -> &str;
}

pub use anthropic::AnthropicEvaluator;
pub use fallback::RuleBasedEvaluator;
