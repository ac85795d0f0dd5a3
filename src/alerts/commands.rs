//! Interactive Telegram commands.
//!
//! The bot answers a small query surface over the same chat the alerts
//! go to: `/positions` lists open positions, `/stats` summarises the
//! ledger, `/kelly <prob%> <price¢>` runs the stake calculator on
//! arbitrary inputs. Updates are polled with an offset cursor once per
//! cycle; messages from any other chat are ignored.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ledger::{LedgerStats, PositionLedger};
use crate::strategy::{recommend, KellyConfig};
use crate::types::Position;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const KELLY_USAGE: &str = "Usage: /kelly &lt;prob%&gt; &lt;price_cents&gt;\nExample: /kelly 35 28";
const KELLY_RANGE: &str = "Probability must be 1-99% and price must be 1-99¢";

// ---------------------------------------------------------------------------
// Command parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    Positions,
    Stats,
    Kelly { prob_pct: f64, price: f64 },
    KellyUsage,
    KellyOutOfRange,
}

/// Parse one incoming message. Returns None for anything that is not a
/// recognised command, so ordinary chat messages stay unanswered.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let text = text.trim().to_lowercase();

    if text == "/positions" {
        return Some(BotCommand::Positions);
    }
    if text == "/stats" {
        return Some(BotCommand::Stats);
    }
    if text.starts_with("/kelly") {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() != 3 {
            return Some(BotCommand::KellyUsage);
        }
        let (Ok(prob_pct), Ok(price)) = (parts[1].parse::<f64>(), parts[2].parse::<f64>()) else {
            return Some(BotCommand::KellyUsage);
        };
        if prob_pct <= 0.0 || prob_pct >= 100.0 || price <= 0.0 || price >= 100.0 {
            return Some(BotCommand::KellyOutOfRange);
        }
        return Some(BotCommand::Kelly { prob_pct, price });
    }
    None
}

/// Resolve a message to its reply, if it was a command.
pub fn respond(
    text: &str,
    ledger: &PositionLedger,
    kelly: &KellyConfig,
    now: DateTime<Utc>,
) -> Option<String> {
    match parse_command(text)? {
        BotCommand::Positions => Some(format_positions(&ledger.open_positions())),
        BotCommand::Stats => Some(format_stats(&ledger.stats(now))),
        BotCommand::Kelly { prob_pct, price } => Some(format_kelly(prob_pct, price, kelly)),
        BotCommand::KellyUsage => Some(KELLY_USAGE.to_string()),
        BotCommand::KellyOutOfRange => Some(KELLY_RANGE.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Reply formatting
// ---------------------------------------------------------------------------

fn format_positions(positions: &[&Position]) -> String {
    if positions.is_empty() {
        return "📊 <b>Open Positions (0)</b>\n\nNo open positions.".to_string();
    }

    let mut lines = vec![format!("📊 <b>Open Positions ({}):</b>", positions.len()), String::new()];
    for p in positions {
        lines.push(format!(
            "{} {}: {:.0}¢ entry ({:+.1}% edge)",
            p.player,
            p.category.to_string().to_uppercase(),
            p.entry_price,
            p.entry_edge_pct
        ));
    }
    lines.join("\n")
}

fn format_stats(stats: &LedgerStats) -> String {
    let mut lines = vec![
        "📈 <b>Position Stats</b>".to_string(),
        String::new(),
        format!("Open: {} | Closed: {}", stats.open_count, stats.closed_count),
    ];

    if stats.closed_count > 0 {
        let wins = (stats.win_rate * stats.closed_count as f64).round() as usize;
        let hold = if stats.avg_hold_minutes >= 60.0 {
            format!("{:.1} hrs", stats.avg_hold_minutes / 60.0)
        } else {
            format!("{:.0} min", stats.avg_hold_minutes)
        };
        lines.push(format!(
            "Win Rate: {:.0}% ({wins}/{})",
            stats.win_rate * 100.0,
            stats.closed_count
        ));
        lines.push(format!("Total P/L: {:+.0}¢", stats.total_realized_pnl));
        lines.push(format!("Avg Hold: {hold}"));
    } else {
        lines.push("No closed positions yet.".to_string());
    }

    lines.join("\n")
}

fn format_kelly(prob_pct: f64, price: f64, config: &KellyConfig) -> String {
    let rec = recommend(prob_pct / 100.0, price, config);
    let ev_mark = if rec.is_positive_ev { "✅" } else { "❌" };

    [
        "🧮 <b>Kelly Calculator</b>".to_string(),
        String::new(),
        format!("Model prob: {prob_pct:.0}% | Price: {price:.0}¢"),
        format!("Breakeven: {:.0}%", rec.breakeven_prob * 100.0),
        format!("Edge over breakeven: {:+.1}%", rec.edge_over_breakeven * 100.0),
        format!("Positive EV: {ev_mark}"),
        format!("Fractional Kelly stake: {:.2}% of bankroll", rec.stake_pct),
    ]
    .join("\n")
}

// ---------------------------------------------------------------------------
// Update polling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    text: Option<String>,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Polls the bot's update queue and answers commands from the
/// configured chat.
pub struct TelegramCommands {
    http: Client,
    bot_token: SecretString,
    chat_id: String,
    kelly: KellyConfig,
    last_update_id: i64,
}

impl TelegramCommands {
    pub fn new(bot_token: SecretString, chat_id: String, kelly: KellyConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            http,
            bot_token,
            chat_id,
            kelly,
            last_update_id: 0,
        })
    }

    /// Fetch pending updates and reply to commands. Each reply failure
    /// is logged and skipped; a failed fetch surfaces to the caller.
    pub async fn poll(&mut self, ledger: &PositionLedger, now: DateTime<Utc>) -> Result<()> {
        let url = format!(
            "{TELEGRAM_API_BASE}/bot{}/getUpdates",
            self.bot_token.expose_secret()
        );
        let offset = (self.last_update_id + 1).to_string();

        let resp = self.http
            .get(&url)
            .query(&[("offset", offset.as_str()), ("timeout", "0")])
            .send()
            .await
            .context("Telegram getUpdates request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Telegram getUpdates returned {}", resp.status());
        }

        let updates: UpdatesResponse = resp
            .json()
            .await
            .context("Failed to parse Telegram updates")?;

        for update in updates.result {
            self.last_update_id = self.last_update_id.max(update.update_id);

            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id.to_string() != self.chat_id {
                debug!(chat = message.chat.id, "Ignoring message from foreign chat");
                continue;
            }
            let Some(text) = message.text else {
                continue;
            };

            if let Some(reply) = respond(&text, ledger, &self.kelly, now) {
                debug!(command = %text.trim(), "Answering bot command");
                if let Err(e) = self.send(&reply).await {
                    warn!(error = %e, "Command reply failed");
                }
            }
        }
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "{TELEGRAM_API_BASE}/bot{}/sendMessage",
            self.bot_token.expose_secret()
        );
        let resp = self.http
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .context("Telegram sendMessage failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Telegram API error {}", resp.status());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ExitPolicy;
    use crate::types::MarketCategory;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(parse_command("/positions"), Some(BotCommand::Positions));
        assert_eq!(parse_command("  /STATS  "), Some(BotCommand::Stats));
        assert_eq!(
            parse_command("/kelly 35 28"),
            Some(BotCommand::Kelly { prob_pct: 35.0, price: 28.0 })
        );
    }

    #[test]
    fn test_parse_ignores_chatter() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/unknown"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_kelly_argument_validation() {
        assert_eq!(parse_command("/kelly"), Some(BotCommand::KellyUsage));
        assert_eq!(parse_command("/kelly 35"), Some(BotCommand::KellyUsage));
        assert_eq!(parse_command("/kelly abc 28"), Some(BotCommand::KellyUsage));
        assert_eq!(parse_command("/kelly 0 28"), Some(BotCommand::KellyOutOfRange));
        assert_eq!(parse_command("/kelly 35 100"), Some(BotCommand::KellyOutOfRange));
        assert_eq!(parse_command("/kelly 120 28"), Some(BotCommand::KellyOutOfRange));
    }

    #[test]
    fn test_positions_reply_empty() {
        let ledger = PositionLedger::new(ExitPolicy::default());
        let reply = respond("/positions", &ledger, &KellyConfig::default(), Utc::now()).unwrap();
        assert!(reply.contains("Open Positions (0)"));
        assert!(reply.contains("No open positions."));
    }

    #[test]
    fn test_positions_reply_lists_entries() {
        let mut ledger = PositionLedger::new(ExitPolicy::default());
        ledger
            .open("T1", "Scottie Scheffler", MarketCategory::Win, 22.0, 12.0, Utc::now())
            .unwrap();
        ledger
            .open("T2", "Rory McIlroy", MarketCategory::Top10, 55.0, 9.5, Utc::now())
            .unwrap();

        let reply = respond("/positions", &ledger, &KellyConfig::default(), Utc::now()).unwrap();
        assert!(reply.contains("Open Positions (2)"));
        assert!(reply.contains("Scottie Scheffler WIN: 22¢ entry (+12.0% edge)"));
        assert!(reply.contains("Rory McIlroy TOP_10: 55¢ entry (+9.5% edge)"));
    }

    #[test]
    fn test_stats_reply_no_closed() {
        let mut ledger = PositionLedger::new(ExitPolicy::default());
        ledger
            .open("T1", "Scottie Scheffler", MarketCategory::Win, 22.0, 12.0, Utc::now())
            .unwrap();

        let reply = respond("/stats", &ledger, &KellyConfig::default(), Utc::now()).unwrap();
        assert!(reply.contains("Open: 1 | Closed: 0"));
        assert!(reply.contains("No closed positions yet."));
    }

    #[test]
    fn test_kelly_reply_positive_ev() {
        let ledger = PositionLedger::new(ExitPolicy::default());
        let reply = respond("/kelly 34 22", &ledger, &KellyConfig::default(), Utc::now()).unwrap();
        assert!(reply.contains("Model prob: 34% | Price: 22¢"));
        assert!(reply.contains("Breakeven: 22%"));
        assert!(reply.contains("Edge over breakeven: +12.0%"));
        assert!(reply.contains("✅"));
    }

    #[test]
    fn test_kelly_reply_negative_ev() {
        let ledger = PositionLedger::new(ExitPolicy::default());
        let reply = respond("/kelly 10 22", &ledger, &KellyConfig::default(), Utc::now()).unwrap();
        assert!(reply.contains("❌"));
        assert!(reply.contains("0.00% of bankroll"));
    }

    #[test]
    fn test_kelly_usage_reply() {
        let ledger = PositionLedger::new(ExitPolicy::default());
        let reply = respond("/kelly nope", &ledger, &KellyConfig::default(), Utc::now()).unwrap();
        assert!(reply.contains("Usage: /kelly"));
    }
}
