//! Shared types for the FAIRWAY agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that feed, strategy, ledger,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Categories & statuses
// ---------------------------------------------------------------------------

/// Golf market category. Each category settles on a different finishing
/// threshold, so a probability quote is only comparable to a market quote
/// of the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCategory {
    Win,
    Top5,
    Top10,
    Top20,
    MakeCut,
}

impl MarketCategory {
    /// All known categories (useful for iteration).
    pub const ALL: &'static [MarketCategory] = &[
        MarketCategory::Win,
        MarketCategory::Top5,
        MarketCategory::Top10,
        MarketCategory::Top20,
        MarketCategory::MakeCut,
    ];

    /// Whether this is the outright-winner category. Early exits
    /// (profit target, edge flip) apply only here.
    pub fn is_winner(&self) -> bool {
        matches!(self, MarketCategory::Win)
    }

    /// The leaderboard position that already satisfies this category,
    /// if it is a finishing-position category.
    pub fn finishing_threshold(&self) -> Option<u32> {
        match self {
            MarketCategory::Top5 => Some(5),
            MarketCategory::Top10 => Some(10),
            MarketCategory::Top20 => Some(20),
            _ => None,
        }
    }
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketCategory::Win => write!(f, "win"),
            MarketCategory::Top5 => write!(f, "top_5"),
            MarketCategory::Top10 => write!(f, "top_10"),
            MarketCategory::Top20 => write!(f, "top_20"),
            MarketCategory::MakeCut => write!(f, "make_cut"),
        }
    }
}

/// Attempt to parse a string into a MarketCategory (case-insensitive).
impl std::str::FromStr for MarketCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "win" | "winner" => Ok(MarketCategory::Win),
            "top_5" | "top5" => Ok(MarketCategory::Top5),
            "top_10" | "top10" => Ok(MarketCategory::Top10),
            "top_20" | "top20" => Ok(MarketCategory::Top20),
            "make_cut" | "makecut" | "cut" => Ok(MarketCategory::MakeCut),
            _ => Err(anyhow::anyhow!("Unknown market category: {s}")),
        }
    }
}

/// Exchange market status. Anything not open or active is excluded
/// at the discovery boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Open,
    Active,
    Other,
}

impl MarketStatus {
    pub fn from_api(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "open" => MarketStatus::Open,
            "active" => MarketStatus::Active,
            _ => MarketStatus::Other,
        }
    }

    pub fn is_tradeable(&self) -> bool {
        matches!(self, MarketStatus::Open | MarketStatus::Active)
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "open"),
            MarketStatus::Active => write!(f, "active"),
            MarketStatus::Other => write!(f, "other"),
        }
    }
}

// ---------------------------------------------------------------------------
// Feed quotes
// ---------------------------------------------------------------------------

/// One model probability for a player/category pair.
/// Probability is a fraction in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityQuote {
    /// Canonical "First Last" name.
    pub player: String,
    pub category: MarketCategory,
    pub probability: f64,
}

impl fmt::Display for ProbabilityQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} = {:.1}%",
            self.player,
            self.category,
            self.probability * 100.0,
        )
    }
}

/// A live exchange quote for one golf market.
/// Prices are in cents (0–100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Unique market ticker, e.g. "KXPGATOUR-25AUG-SSCHEF".
    pub ticker: String,
    /// Player name as the exchange prints it (not yet reconciled).
    pub player_raw: String,
    pub category: MarketCategory,
    pub yes_ask: f64,
    pub yes_bid: f64,
    pub status: MarketStatus,
}

impl MarketQuote {
    /// Implied probability of the YES side, from the ask price.
    pub fn implied_probability(&self) -> f64 {
        self.yes_ask / 100.0
    }

    /// Bid/ask spread in cents.
    pub fn spread(&self) -> f64 {
        self.yes_ask - self.yes_bid
    }

    /// Whether this market should be considered at all this cycle.
    pub fn is_eligible(&self) -> bool {
        self.status.is_tradeable() && self.yes_bid > 0.0
    }
}

impl fmt::Display for MarketQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} (ask {:.0}¢ / bid {:.0}¢, {})",
            self.ticker,
            self.player_raw,
            self.category,
            self.yes_ask,
            self.yes_bid,
            self.status,
        )
    }
}

/// A probability quote reconciled with a market quote of the same category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPair {
    pub probability: ProbabilityQuote,
    pub market: MarketQuote,
    /// Name similarity score that produced the match.
    pub similarity: f64,
}

// ---------------------------------------------------------------------------
// Opportunities & decisions
// ---------------------------------------------------------------------------

/// A matched pair that cleared every filter gate. Immutable once created;
/// persisted to the audit sink regardless of the downstream decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub ticker: String,
    pub player: String,
    pub category: MarketCategory,
    /// Model probability, fraction in [0, 1].
    pub model_prob: f64,
    /// Market implied probability, fraction in [0, 1].
    pub implied_prob: f64,
    /// Signed edge in percentage points: (model - implied) * 100.
    pub edge_pct: f64,
    /// Bid/ask spread in cents.
    pub spread: f64,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | model={:.1}% mkt={:.1}% edge={:+.1}% spread={:.0}¢ [{}]",
            self.player,
            self.category,
            self.model_prob * 100.0,
            self.implied_prob * 100.0,
            self.edge_pct,
            self.spread,
            self.ticker,
        )
    }
}

/// Final evaluator verdict on an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Bet,
    Pass,
    Watch,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Bet => write!(f, "BET"),
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Watch => write!(f, "WATCH"),
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BET" => Ok(Verdict::Bet),
            "PASS" => Ok(Verdict::Pass),
            "WATCH" => Ok(Verdict::Watch),
            _ => Err(anyhow::anyhow!("Unknown verdict: {s}")),
        }
    }
}

/// Evaluator decision on an opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    /// Self-reported confidence (0–1).
    pub confidence: f64,
    /// Suggested stake as a percentage of bankroll (0–5).
    pub suggested_stake_pct: f64,
    pub reasoning: String,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conf={:.0}% stake={:.1}%",
            self.verdict,
            self.confidence * 100.0,
            self.suggested_stake_pct,
        )
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Position lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A paper position on one market ticker. Created on a BET verdict,
/// closed exactly once, never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub player: String,
    pub category: MarketCategory,
    /// YES ask at entry, cents.
    pub entry_price: f64,
    /// Signed edge at entry, percentage points.
    pub entry_edge_pct: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Realized P&L in cents per contract. None while the position is open.
    pub fn profit_loss(&self) -> Option<f64> {
        self.exit_price.map(|exit| exit - self.entry_price)
    }

    /// How long the position was (or has been) held.
    pub fn hold_duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.closed_at.unwrap_or(now) - self.opened_at
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.profit_loss() {
            Some(pnl) => write!(
                f,
                "[{}] {} {} {} entry={:.0}¢ exit={:.0}¢ ({:+.0}¢)",
                self.ticker,
                self.player,
                self.category,
                self.status,
                self.entry_price,
                self.exit_price.unwrap_or(0.0),
                pnl,
            ),
            None => write!(
                f,
                "[{}] {} {} {} entry={:.0}¢ edge={:+.1}%",
                self.ticker,
                self.player,
                self.category,
                self.status,
                self.entry_price,
                self.entry_edge_pct,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

/// Live tournament standing for one player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Numeric position; ties collapse to the shared number (T4 → 4).
    pub position: u32,
    pub score_to_par: i32,
    pub round_number: u32,
    /// Holes completed in the current round (0–18).
    pub thru: u32,
    pub holes_remaining: u32,
}

impl fmt::Display for LeaderboardEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pos {} ({:+}) R{} thru {}",
            self.position, self.score_to_par, self.round_number, self.thru,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for FAIRWAY.
#[derive(Debug, thiserror::Error)]
pub enum FairwayError {
    #[error("Feed error ({feed}): {message}")]
    Feed { feed: String, message: String },

    #[error("Evaluator error ({name}): {message}")]
    Evaluator { name: String, message: String },

    #[error("Duplicate position for ticker {ticker}")]
    DuplicatePosition { ticker: String },

    #[error("Settlement lookup failed for {ticker}: {message}")]
    SettlementLookup { ticker: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notification error: {0}")]
    Notify(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
