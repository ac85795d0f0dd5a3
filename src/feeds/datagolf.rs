//! Data Golf feed client.
//!
//! Fetches live in-play probabilities and builds the leaderboard context
//! from the same payload. Sportsbook odds are optional enrichment: a
//! failed odds fetch logs at debug and returns empty.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::matching::normalize_name;
use crate::types::{LeaderboardEntry, MarketCategory, ProbabilityQuote};

const LIVE_PREDS_URL: &str = "https://feeds.datagolf.com/preds/in-play";
const BOOK_ODDS_URL: &str = "https://feeds.datagolf.com/betting/source-matchup-odds";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

/// The live feed returns either a bare array or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlayersPayload {
    List(Vec<RawPlayer>),
    Wrapped { data: Vec<RawPlayer> },
}

impl PlayersPayload {
    fn into_players(self) -> Vec<RawPlayer> {
        match self {
            PlayersPayload::List(players) => players,
            PlayersPayload::Wrapped { data } => data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(default)]
    player_name: String,
    #[serde(default)]
    win: f64,
    #[serde(default)]
    top_5: f64,
    #[serde(default)]
    top_10: f64,
    #[serde(default)]
    top_20: f64,
    #[serde(default)]
    make_cut: f64,
    #[serde(default)]
    current_pos: String,
    #[serde(default)]
    current_score: i32,
    #[serde(default)]
    round: u32,
    #[serde(default)]
    thru: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OddsPayload {
    List(Vec<serde_json::Value>),
    Wrapped {
        #[serde(default)]
        odds: Vec<serde_json::Value>,
    },
}

impl OddsPayload {
    fn into_entries(self) -> Vec<serde_json::Value> {
        match self {
            OddsPayload::List(entries) => entries,
            OddsPayload::Wrapped { odds } => odds,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One cycle's worth of model data.
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
    /// Per player/category model probabilities, fractions in [0, 1].
    pub quotes: Vec<ProbabilityQuote>,
    /// Canonical name → live standing.
    pub leaderboard: HashMap<String, LeaderboardEntry>,
    /// Whether a tournament is currently in play.
    pub tournament_active: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DataGolfClient {
    http: Client,
    api_key: SecretString,
}

impl DataGolfClient {
    pub fn new(api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build Data Golf HTTP client")?;
        Ok(Self { http, api_key })
    }

    /// Fetch live in-play probabilities and the leaderboard.
    ///
    /// An empty payload, or a finished tournament (every weekend player
    /// has completed round 4), produces an inactive snapshot rather
    /// than an error.
    pub async fn fetch_live(&self) -> Result<LiveSnapshot> {
        let payload: PlayersPayload = self.http
            .get(LIVE_PREDS_URL)
            .query(&[
                ("tour", "pga"),
                ("odds_format", "percent"),
                ("file_format", "json"),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await
            .context("Data Golf live fetch failed")?
            .error_for_status()
            .context("Data Golf live fetch returned an error status")?
            .json()
            .await
            .context("Failed to parse Data Golf live payload")?;

        let players = payload.into_players();
        if players.is_empty() {
            info!("Data Golf returned no players (no live tournament)");
            return Ok(LiveSnapshot::default());
        }

        if tournament_finished(&players) {
            info!("Tournament finished (all weekend players round 4 thru 18)");
            return Ok(LiveSnapshot::default());
        }

        let mut quotes = Vec::with_capacity(players.len() * MarketCategory::ALL.len());
        let mut leaderboard = HashMap::with_capacity(players.len());

        for p in &players {
            if p.player_name.trim().is_empty() {
                continue;
            }
            let name = normalize_name(&p.player_name);

            for (category, pct) in [
                (MarketCategory::Win, p.win),
                (MarketCategory::Top5, p.top_5),
                (MarketCategory::Top10, p.top_10),
                (MarketCategory::Top20, p.top_20),
                (MarketCategory::MakeCut, p.make_cut),
            ] {
                quotes.push(ProbabilityQuote {
                    player: name.clone(),
                    category,
                    // Feed sends percent; store fractions.
                    probability: (pct / 100.0).clamp(0.0, 1.0),
                });
            }

            leaderboard.insert(name, leaderboard_entry(p));
        }

        info!(players = leaderboard.len(), "Data Golf live probabilities fetched");
        Ok(LiveSnapshot {
            quotes,
            leaderboard,
            tournament_active: true,
        })
    }

    /// Fetch per-book implied probabilities for one category.
    /// Optional enrichment: failures return an empty map.
    pub async fn fetch_book_odds(&self, category: MarketCategory) -> HashMap<String, HashMap<String, f64>> {
        let result = self.http
            .get(BOOK_ODDS_URL)
            .query(&[
                ("tour", "pga"),
                ("market", &category.to_string()),
                ("odds_format", "implied_prob"),
                ("file_format", "json"),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await;

        let payload: OddsPayload = match result {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json().await {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(category = %category, error = %e, "Book odds parse failed (optional)");
                        return HashMap::new();
                    }
                },
                Err(e) => {
                    debug!(category = %category, error = %e, "Book odds fetch failed (optional)");
                    return HashMap::new();
                }
            },
            Err(e) => {
                debug!(category = %category, error = %e, "Book odds fetch failed (optional)");
                return HashMap::new();
            }
        };

        let mut result = HashMap::new();
        for entry in payload.into_entries() {
            let Some(raw_name) = entry.get("player_name").and_then(|v| v.as_str()) else {
                continue;
            };
            if raw_name.trim().is_empty() {
                continue;
            }
            let name = normalize_name(raw_name);

            let mut books = HashMap::new();
            if let Some(obj) = entry.as_object() {
                for (key, val) in obj {
                    if matches!(key.as_str(), "player_name" | "dg_id" | "player_id") {
                        continue;
                    }
                    if let Some(prob) = val.as_f64() {
                        if prob > 0.0 {
                            books.insert(key.to_lowercase(), prob);
                        }
                    }
                }
            }
            if !books.is_empty() {
                result.insert(name, books);
            }
        }

        if result.is_empty() {
            warn!(category = %category, "No book odds available this cycle");
        } else {
            info!(category = %category, players = result.len(), "Book odds fetched");
        }
        result
    }
}

fn leaderboard_entry(p: &RawPlayer) -> LeaderboardEntry {
    // "T4" → 4; unparseable positions (CUT, WD) sink to the bottom
    let position = p
        .current_pos
        .trim()
        .trim_start_matches('T')
        .parse::<u32>()
        .unwrap_or(999);

    LeaderboardEntry {
        position,
        score_to_par: p.current_score,
        round_number: p.round.max(1),
        thru: p.thru,
        holes_remaining: if p.thru > 0 { 18 - p.thru.min(18) } else { 18 },
    }
}

/// All players who made the weekend have completed round 4.
fn tournament_finished(players: &[RawPlayer]) -> bool {
    let weekend: Vec<&RawPlayer> = players
        .iter()
        .filter(|p| !p.player_name.trim().is_empty() && p.round >= 3)
        .collect();

    !weekend.is_empty() && weekend.iter().all(|p| p.round >= 4 && p.thru >= 18)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_player(name: &str, round: u32, thru: u32) -> RawPlayer {
        RawPlayer {
            player_name: name.into(),
            win: 25.3,
            top_5: 55.1,
            top_10: 72.0,
            top_20: 88.0,
            make_cut: 100.0,
            current_pos: "T4".into(),
            current_score: -8,
            round,
            thru,
        }
    }

    #[test]
    fn test_payload_bare_list() {
        let json = r#"[{"player_name": "Scheffler, Scottie", "win": 25.3}]"#;
        let payload: PlayersPayload = serde_json::from_str(json).unwrap();
        let players = payload.into_players();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].player_name, "Scheffler, Scottie");
        assert!((players[0].win - 25.3).abs() < 1e-10);
        assert_eq!(players[0].round, 0); // defaulted
    }

    #[test]
    fn test_payload_wrapped() {
        let json = r#"{"data": [{"player_name": "McIlroy, Rory", "top_10": 72.0}]}"#;
        let payload: PlayersPayload = serde_json::from_str(json).unwrap();
        let players = payload.into_players();
        assert_eq!(players.len(), 1);
        assert!((players[0].top_10 - 72.0).abs() < 1e-10);
    }

    #[test]
    fn test_leaderboard_entry_tie_position() {
        let entry = leaderboard_entry(&raw_player("X", 3, 12));
        assert_eq!(entry.position, 4); // "T4"
        assert_eq!(entry.score_to_par, -8);
        assert_eq!(entry.round_number, 3);
        assert_eq!(entry.holes_remaining, 6);
    }

    #[test]
    fn test_leaderboard_entry_unparseable_position() {
        let mut p = raw_player("X", 2, 0);
        p.current_pos = "CUT".into();
        let entry = leaderboard_entry(&p);
        assert_eq!(entry.position, 999);
        assert_eq!(entry.holes_remaining, 18); // thru 0 → full round ahead
    }

    #[test]
    fn test_tournament_finished_all_done() {
        let players = vec![raw_player("A", 4, 18), raw_player("B", 4, 18)];
        assert!(tournament_finished(&players));
    }

    #[test]
    fn test_tournament_not_finished_mid_round() {
        let players = vec![raw_player("A", 4, 18), raw_player("B", 4, 11)];
        assert!(!tournament_finished(&players));
    }

    #[test]
    fn test_tournament_not_finished_no_weekend_players() {
        // Thursday field: nobody has reached round 3 yet
        let players = vec![raw_player("A", 1, 9), raw_player("B", 2, 18)];
        assert!(!tournament_finished(&players));
    }

    #[test]
    fn test_tournament_finished_ignores_cut_players() {
        // Cut players sit at round 2; only weekend players count
        let players = vec![raw_player("A", 2, 18), raw_player("B", 4, 18)];
        assert!(tournament_finished(&players));
    }
}
