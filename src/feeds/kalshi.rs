//! Kalshi exchange client.
//!
//! Discovers live golf markets across the PGA series tickers and parses
//! player/category out of each market's title. Also the settlement
//! source: finalized markets report a definitive yes/no/void result.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::SettlementSource;
use crate::ledger::SettlementOutcome;
use crate::types::{MarketCategory, MarketQuote, MarketStatus};

/// Series tickers covering every golf category we trade.
const GOLF_SERIES: [&str; 6] = [
    "KXPGATOUR",
    "KXPGA",
    "KXPGATOP5",
    "KXPGATOP10",
    "KXPGATOP20",
    "KXPGACUT",
];

/// Maximum retries on rate limit errors per series.
const MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    markets: Vec<RawMarket>,
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    ticker: String,
    #[serde(default)]
    event_ticker: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    yes_ask: f64,
    #[serde(default)]
    yes_bid: f64,
}

#[derive(Debug, Deserialize)]
struct MarketResponse {
    market: SettlementMarket,
}

#[derive(Debug, Deserialize)]
struct SettlementMarket {
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KalshiClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl KalshiClient {
    pub fn new(api_key: SecretString, base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build Kalshi HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = 1000 * 2u64.pow(attempt - 1);
                debug!(path, attempt, delay_ms = delay, "Retrying Kalshi request");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self.http
                .get(&url)
                .header("KALSHI-ACCESS-KEY", self.api_key.expose_secret())
                .query(params)
                .send()
                .await
                .context("Kalshi request failed")?;

            let status = resp.status();
            if status.as_u16() == 429 {
                warn!(path, attempt, "Kalshi rate limit hit");
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Kalshi API error {status}: {body}");
            }

            return resp.json::<T>().await.context("Failed to parse Kalshi response");
        }

        anyhow::bail!("Kalshi request to {path} rate-limited after {MAX_RETRIES} retries")
    }

    /// Discover live golf markets across all series tickers.
    ///
    /// The discovery boundary enforces the liquidity invariant: markets
    /// that are not open/active, have no ask, or have no resting bids
    /// never enter a cycle. A series that fails to fetch is skipped, not
    /// fatal.
    pub async fn discover_markets(&self) -> Result<Vec<MarketQuote>> {
        let mut quotes = Vec::new();

        for series in GOLF_SERIES {
            let response: EventsResponse = match self
                .get_json(
                    "/events",
                    &[
                        ("series_ticker", series),
                        ("with_nested_markets", "true"),
                        ("status", "open"),
                        ("limit", "100"),
                    ],
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(series, error = %e, "Series fetch failed, skipping");
                    continue;
                }
            };

            for event in response.events {
                for m in event.markets {
                    let status = MarketStatus::from_api(&m.status);
                    if !status.is_tradeable() || m.yes_ask <= 0.0 || m.yes_bid <= 0.0 {
                        continue;
                    }

                    let Some((player_raw, category)) = parse_market(&m) else {
                        continue;
                    };

                    quotes.push(MarketQuote {
                        ticker: m.ticker,
                        player_raw,
                        category,
                        yes_ask: m.yes_ask,
                        yes_bid: m.yes_bid,
                        status,
                    });
                }
            }
        }

        info!(markets = quotes.len(), "Golf markets discovered");
        Ok(quotes)
    }
}

/// Extract player name and category from a market's title/subtitle.
/// Returns None for markets we don't trade (round leader, unparseable).
fn parse_market(m: &RawMarket) -> Option<(String, MarketCategory)> {
    let combined = format!("{} {}", m.title, m.subtitle).to_lowercase();

    // First-round-leader markets share the series but not the semantics.
    if combined.contains("round leader") {
        return None;
    }

    let category = parse_category(&m.event_ticker, &combined);
    let name = parse_player_name(&m.title, &m.subtitle)?;
    Some((name, category))
}

fn parse_category(event_ticker: &str, combined_lower: &str) -> MarketCategory {
    let event_ticker = event_ticker.to_uppercase();
    if event_ticker.contains("TOP5") || combined_lower.contains("top 5") || combined_lower.contains("top five") {
        MarketCategory::Top5
    } else if event_ticker.contains("TOP10") || combined_lower.contains("top 10") || combined_lower.contains("top ten") {
        MarketCategory::Top10
    } else if event_ticker.contains("TOP20") || combined_lower.contains("top 20") || combined_lower.contains("top twenty") {
        MarketCategory::Top20
    } else if event_ticker.contains("PGACUT") || combined_lower.contains("make the cut") || combined_lower.contains("make cut") {
        MarketCategory::MakeCut
    } else {
        MarketCategory::Win
    }
}

/// Titles read "Will <player> win ..." / "<player> to finish ...".
/// Falls back to the subtitle when it looks like a bare name.
fn parse_player_name(title: &str, subtitle: &str) -> Option<String> {
    let lower = title.to_lowercase();

    if let Some(rest_start) = lower.find("will ").map(|i| i + "will ".len()) {
        let rest = &title[rest_start..];
        let rest_lower = &lower[rest_start..];
        for verb in [" win", " finish", " place", " make"] {
            if let Some(end) = rest_lower.find(verb) {
                let name = rest[..end].trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
    }

    for marker in [" to win", " to finish", " to place"] {
        if let Some(end) = lower.find(marker) {
            let name = title[..end].trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    let subtitle = subtitle.trim();
    if !subtitle.is_empty() && subtitle.split_whitespace().count() <= 4 {
        return Some(subtitle.to_string());
    }

    None
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[async_trait]
impl SettlementSource for KalshiClient {
    async fn fetch_settlement(&self, ticker: &str) -> Result<Option<SettlementOutcome>> {
        let response: MarketResponse = self
            .get_json(&format!("/markets/{ticker}"), &[])
            .await
            .with_context(|| format!("Settlement lookup for {ticker} failed"))?;

        let market = response.market;
        if !matches!(market.status.to_lowercase().as_str(), "settled" | "finalized" | "closed") {
            return Ok(None);
        }

        let outcome = match market.result.to_lowercase().as_str() {
            "yes" => Some(SettlementOutcome::Yes),
            "no" => Some(SettlementOutcome::No),
            "void" | "voided" | "scratch" => Some(SettlementOutcome::Void),
            // Finalized but no recognizable result yet: try again later.
            _ => None,
        };

        debug!(ticker, status = %market.status, result = %market.result, "Settlement lookup");
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_market(title: &str, subtitle: &str, event_ticker: &str) -> RawMarket {
        RawMarket {
            ticker: "T1".into(),
            event_ticker: event_ticker.into(),
            title: title.into(),
            subtitle: subtitle.into(),
            status: "open".into(),
            yes_ask: 22.0,
            yes_bid: 18.0,
        }
    }

    // -- parse_market tests --

    #[test]
    fn test_parse_will_win_title() {
        let m = raw_market("Will Scottie Scheffler win the BMW Championship?", "", "KXPGATOUR-25AUG");
        let (name, category) = parse_market(&m).unwrap();
        assert_eq!(name, "Scottie Scheffler");
        assert_eq!(category, MarketCategory::Win);
    }

    #[test]
    fn test_parse_finish_top_five() {
        let m = raw_market(
            "Will Rory McIlroy finish in the top 5?",
            "",
            "KXPGATOP5-25AUG",
        );
        let (name, category) = parse_market(&m).unwrap();
        assert_eq!(name, "Rory McIlroy");
        assert_eq!(category, MarketCategory::Top5);
    }

    #[test]
    fn test_parse_to_win_form() {
        let m = raw_market("Tommy Fleetwood to win", "", "KXPGATOUR-25AUG");
        let (name, category) = parse_market(&m).unwrap();
        assert_eq!(name, "Tommy Fleetwood");
        assert_eq!(category, MarketCategory::Win);
    }

    #[test]
    fn test_parse_make_cut() {
        let m = raw_market("Will Jordan Spieth make the cut?", "", "KXPGACUT-25AUG");
        let (name, category) = parse_market(&m).unwrap();
        assert_eq!(name, "Jordan Spieth");
        assert_eq!(category, MarketCategory::MakeCut);
    }

    #[test]
    fn test_parse_category_from_event_ticker() {
        let m = raw_market("Will Xander Schauffele finish in position?", "", "KXPGATOP20-25AUG");
        let (_, category) = parse_market(&m).unwrap();
        assert_eq!(category, MarketCategory::Top20);
    }

    #[test]
    fn test_parse_subtitle_fallback() {
        let m = raw_market("Top 10 finish", "Collin Morikawa", "KXPGATOP10-25AUG");
        let (name, category) = parse_market(&m).unwrap();
        assert_eq!(name, "Collin Morikawa");
        assert_eq!(category, MarketCategory::Top10);
    }

    #[test]
    fn test_parse_round_leader_excluded() {
        let m = raw_market("Will Ludvig Aberg be the first round leader?", "", "KXPGA-25AUG");
        assert!(parse_market(&m).is_none());
    }

    #[test]
    fn test_parse_unparseable_excluded() {
        let m = raw_market(
            "Tournament outright market",
            "A very long subtitle that is definitely not a player name",
            "KXPGATOUR-25AUG",
        );
        assert!(parse_market(&m).is_none());
    }

    // -- settlement mapping tests --

    fn settlement_json(status: &str, result: &str) -> String {
        format!(r#"{{"market": {{"status": "{status}", "result": "{result}"}}}}"#)
    }

    #[test]
    fn test_settlement_market_parses() {
        let resp: MarketResponse = serde_json::from_str(&settlement_json("settled", "yes")).unwrap();
        assert_eq!(resp.market.status, "settled");
        assert_eq!(resp.market.result, "yes");
    }

    #[test]
    fn test_settlement_missing_result_defaults_empty() {
        let resp: MarketResponse =
            serde_json::from_str(r#"{"market": {"status": "active"}}"#).unwrap();
        assert!(resp.market.result.is_empty());
    }

    // -- events response parsing --

    #[test]
    fn test_events_response_parses() {
        let json = r#"{
            "events": [{
                "markets": [{
                    "ticker": "KXPGATOUR-25AUG-SSCHEF",
                    "event_ticker": "KXPGATOUR-25AUG",
                    "title": "Will Scottie Scheffler win the BMW Championship?",
                    "subtitle": "",
                    "status": "open",
                    "yes_ask": 22,
                    "yes_bid": 18
                }]
            }]
        }"#;
        let resp: EventsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.events.len(), 1);
        let m = &resp.events[0].markets[0];
        assert!((m.yes_ask - 22.0).abs() < 1e-10);
    }
}
