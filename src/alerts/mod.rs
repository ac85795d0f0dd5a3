//! Telegram alerting.
//!
//! Recommendations go out with a per-ticker cooldown so a market that
//! stays attractive across cycles does not spam the chat. Exit alerts
//! are one-time events and bypass the gate. Alert failures are logged
//! and never abort a cycle. Incoming chat commands are handled in
//! [`commands`].

pub mod commands;

pub use commands::TelegramCommands;

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ledger::ExitReason;
use crate::strategy::{EdgeValidation, StakeRecommendation};
use crate::types::{Decision, LeaderboardEntry, Opportunity, Position};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default minutes between repeat alerts for the same ticker.
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 30;

// ---------------------------------------------------------------------------
// Cooldown gate
// ---------------------------------------------------------------------------

/// Per-ticker alert cooldown. Markets that keep qualifying only alert
/// once per window.
#[derive(Debug)]
pub struct AlertGate {
    last_sent: HashMap<String, DateTime<Utc>>,
    cooldown: Duration,
}

impl AlertGate {
    pub fn new(cooldown_minutes: i64) -> Self {
        Self {
            last_sent: HashMap::new(),
            cooldown: Duration::minutes(cooldown_minutes),
        }
    }

    pub fn ready(&self, ticker: &str, now: DateTime<Utc>) -> bool {
        match self.last_sent.get(ticker) {
            Some(sent_at) => now - *sent_at >= self.cooldown,
            None => true,
        }
    }

    pub fn mark_sent(&mut self, ticker: &str, now: DateTime<Utc>) {
        self.last_sent.insert(ticker.to_string(), now);
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MINUTES)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

pub struct TelegramNotifier {
    http: Client,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            http,
            bot_token,
            chat_id,
        })
    }

    /// Send an HTML-formatted message. Failures are reported but callers
    /// treat them as non-fatal.
    pub async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "{TELEGRAM_API_BASE}/bot{}/sendMessage",
            self.bot_token.expose_secret()
        );
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
        };

        let resp = self.http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "Telegram send failed");
            anyhow::bail!("Telegram API error {status}: {body}");
        }

        info!("Telegram alert sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message formatting
// ---------------------------------------------------------------------------

/// Build the recommendation message for a fresh decision.
pub fn format_recommendation(
    opportunity: &Opportunity,
    decision: &Decision,
    yes_ask: f64,
    yes_bid: f64,
    leaderboard: Option<&LeaderboardEntry>,
    validation: Option<&EdgeValidation>,
    stake: Option<&StakeRecommendation>,
) -> String {
    let mut lines = vec![
        format!("<b>🎯 {} RECOMMENDATION</b>", decision.verdict),
        format!(
            "<b>{} {}</b>",
            opportunity.player,
            opportunity.category.to_string().to_uppercase()
        ),
        String::new(),
        format!(
            "Model: <code>{:.0}%</code> | Market: <code>{yes_ask:.0}¢ ask ({yes_bid:.0}¢ bid)</code> | Spread: <code>{:.0}¢</code>",
            opportunity.model_prob * 100.0,
            opportunity.spread
        ),
        format!(
            "Edge: <code>{:+.1}%</code> | Confidence: <code>{:.0}%</code>",
            opportunity.edge_pct,
            decision.confidence * 100.0
        ),
    ];

    if let Some(v) = validation {
        let mut line = format!("Validation: {}", v.confidence);
        if let Some(pinnacle) = v.edge_vs_pinnacle {
            line.push_str(&format!(" | vs Pinnacle: <code>{pinnacle:+.1}%</code>"));
        }
        lines.push(line);
    }

    match stake {
        Some(s) => lines.push(format!(
            "Kelly Stake: <code>{:.2}%</code> of bankroll | Edge over breakeven: <code>{:+.1}%</code>",
            s.stake_pct,
            s.edge_over_breakeven * 100.0
        )),
        None => lines.push(format!(
            "Stake: <code>{:.1}%</code> of bankroll",
            decision.suggested_stake_pct
        )),
    }

    if let Some(lb) = leaderboard {
        lines.push(String::new());
        lines.push(format!(
            "Position: {} | Score: {:+} | R{} thru {} ({} remaining)",
            lb.position, lb.score_to_par, lb.round_number, lb.thru, lb.holes_remaining
        ));
    }

    lines.push(String::new());
    lines.push("<b>💭 Reasoning</b>".to_string());
    lines.push(decision.reasoning.clone());
    lines.push(String::new());
    lines.push(format!(
        "<i>⏱ Detected {} | ask={yes_ask:.0}¢ bid={yes_bid:.0}¢</i>",
        opportunity.detected_at.format("%H:%M:%S")
    ));

    lines.join("\n")
}

/// Build the exit message for a closed position.
pub fn format_sell_alert(position: &Position, reason: &ExitReason) -> String {
    let exit_price = position.exit_price.unwrap_or(position.entry_price);
    let pnl = exit_price - position.entry_price;
    debug!(ticker = %position.ticker, pnl = format!("{pnl:+.0}¢"), "Formatting exit alert");

    [
        format!(
            "<b>💰 SELL: {} {}</b>",
            position.player,
            position.category.to_string().to_uppercase()
        ),
        format!(
            "Entry: {:.0}¢ → Exit: {:.0}¢ ({pnl:+.0}¢)",
            position.entry_price, exit_price
        ),
        format!("Reason: {reason}"),
    ]
    .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketCategory, PositionStatus, Verdict};
    use uuid::Uuid;

    fn make_opportunity() -> Opportunity {
        Opportunity {
            id: Uuid::new_v4(),
            ticker: "KXPGATOUR-25AUG-SSCHEF".into(),
            player: "Scottie Scheffler".into(),
            category: MarketCategory::Win,
            model_prob: 0.34,
            implied_prob: 0.22,
            edge_pct: 12.0,
            spread: 4.0,
            detected_at: Utc::now(),
        }
    }

    fn make_decision() -> Decision {
        Decision {
            verdict: Verdict::Bet,
            confidence: 0.7,
            suggested_stake_pct: 2.0,
            reasoning: "Model probability well above market".into(),
        }
    }

    #[test]
    fn test_gate_allows_first_alert() {
        let gate = AlertGate::new(30);
        assert!(gate.ready("T1", Utc::now()));
    }

    #[test]
    fn test_gate_blocks_within_cooldown() {
        let mut gate = AlertGate::new(30);
        let now = Utc::now();
        gate.mark_sent("T1", now);
        assert!(!gate.ready("T1", now + Duration::minutes(29)));
        assert!(gate.ready("T1", now + Duration::minutes(30)));
    }

    #[test]
    fn test_gate_is_per_ticker() {
        let mut gate = AlertGate::new(30);
        let now = Utc::now();
        gate.mark_sent("T1", now);
        assert!(gate.ready("T2", now));
    }

    #[test]
    fn test_recommendation_includes_core_fields() {
        let msg = format_recommendation(
            &make_opportunity(),
            &make_decision(),
            22.0,
            18.0,
            None,
            None,
            None,
        );
        assert!(msg.contains("BET RECOMMENDATION"));
        assert!(msg.contains("Scottie Scheffler WIN"));
        assert!(msg.contains("+12.0%"));
        assert!(msg.contains("22¢ ask"));
        assert!(msg.contains("18¢ bid"));
        assert!(msg.contains("Spread: <code>4¢</code>"));
        assert!(msg.contains("Stake: <code>2.0%</code>"));
    }

    #[test]
    fn test_recommendation_prefers_kelly_line() {
        let stake = StakeRecommendation {
            stake_pct: 1.25,
            breakeven_prob: 0.22,
            edge_over_breakeven: 0.12,
            is_positive_ev: true,
        };
        let msg = format_recommendation(
            &make_opportunity(),
            &make_decision(),
            22.0,
            18.0,
            None,
            None,
            Some(&stake),
        );
        assert!(msg.contains("Kelly Stake: <code>1.25%</code>"));
        assert!(!msg.contains("Stake: <code>2.0%</code>"));
    }

    #[test]
    fn test_recommendation_leaderboard_line() {
        let lb = LeaderboardEntry {
            position: 4,
            score_to_par: -8,
            round_number: 3,
            thru: 12,
            holes_remaining: 6,
        };
        let msg = format_recommendation(
            &make_opportunity(),
            &make_decision(),
            22.0,
            18.0,
            Some(&lb),
            None,
            None,
        );
        assert!(msg.contains("Position: 4 | Score: -8 | R3 thru 12 (6 remaining)"));
    }

    #[test]
    fn test_sell_alert_format() {
        let position = Position {
            ticker: "T1".into(),
            player: "Rory McIlroy".into(),
            category: MarketCategory::Win,
            entry_price: 30.0,
            entry_edge_pct: 10.0,
            status: PositionStatus::Closed,
            exit_price: Some(46.0),
            exit_reason: Some("profit target".into()),
            opened_at: Utc::now(),
            closed_at: Some(Utc::now()),
        };
        let msg = format_sell_alert(&position, &ExitReason::ProfitTarget { yes_bid: 46.0 });
        assert!(msg.contains("SELL: Rory McIlroy WIN"));
        assert!(msg.contains("Entry: 30¢ → Exit: 46¢ (+16¢)"));
    }
}
