//! Position ledger: the open/monitor/close state machine.
//!
//! One entry per market ticker, created on a BET verdict and closed
//! exactly once. A closed ticker never reopens — exchange tickers are
//! single-use, so any second open attempt on the same ticker is a bug
//! upstream and is rejected rather than overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::types::{FairwayError, MarketCategory, Position, PositionStatus};

// ---------------------------------------------------------------------------
// Exit policy
// ---------------------------------------------------------------------------

/// Early-exit thresholds. Only winner-category positions are eligible:
/// position markets (top 5/10/20, make cut) ride to settlement because
/// their prices pin to 0/100 too fast for mid-flight exits to pay.
#[derive(Debug, Clone)]
pub struct ExitPolicy {
    /// Close when yes_bid has risen this many cents above entry.
    pub profit_target: f64,
    /// Close when the live edge has fallen to or below this (negative).
    pub edge_flip_threshold: f64,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            profit_target: 15.0,
            edge_flip_threshold: -8.0,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitReason {
    ProfitTarget { yes_bid: f64 },
    EdgeFlip { edge_pct: f64 },
    SettledYes,
    SettledNo,
    Voided,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::ProfitTarget { yes_bid } => {
                write!(f, "profit target hit (bid {yes_bid:.0}¢)")
            }
            ExitReason::EdgeFlip { edge_pct } => write!(f, "edge flipped to {edge_pct:+.1}%"),
            ExitReason::SettledYes => write!(f, "settled YES"),
            ExitReason::SettledNo => write!(f, "settled NO"),
            ExitReason::Voided => write!(f, "market voided"),
        }
    }
}

/// Definitive settlement outcome reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    Yes,
    No,
    Void,
}

/// Ledger event emitted during a cycle, for audit and alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PositionEvent {
    Opened {
        ticker: String,
        player: String,
        category: MarketCategory,
        entry_price: f64,
        entry_edge_pct: f64,
    },
    DuplicateRejected {
        ticker: String,
    },
    Closed {
        ticker: String,
        player: String,
        category: MarketCategory,
        entry_price: f64,
        exit_price: f64,
        exit_reason: ExitReason,
        profit_loss: f64,
    },
    /// Settlement lookup failed or returned nothing; retry next cycle.
    SettlementPending {
        ticker: String,
    },
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Aggregate ledger statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub open_count: usize,
    pub closed_count: usize,
    /// Fraction of closed positions with positive P&L. 0.0 when nothing
    /// has closed yet.
    pub win_rate: f64,
    /// Total realized P&L in cents per contract.
    pub total_realized_pnl: f64,
    /// Mean hold time of closed positions, minutes.
    pub avg_hold_minutes: f64,
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "open={} closed={} win_rate={:.1}% pnl={:+.0}¢ avg_hold={:.0}m",
            self.open_count,
            self.closed_count,
            self.win_rate * 100.0,
            self.total_realized_pnl,
            self.avg_hold_minutes,
        )
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Snapshot of all positions, suitable for JSON persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub positions: Vec<Position>,
}

pub struct PositionLedger {
    positions: HashMap<String, Position>,
    policy: ExitPolicy,
}

impl PositionLedger {
    pub fn new(policy: ExitPolicy) -> Self {
        Self {
            positions: HashMap::new(),
            policy,
        }
    }

    /// Open a position on a ticker. Fails with `DuplicatePosition` if the
    /// ticker already has any entry, open or closed.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        ticker: &str,
        player: &str,
        category: MarketCategory,
        entry_price: f64,
        entry_edge_pct: f64,
        now: DateTime<Utc>,
    ) -> Result<PositionEvent, FairwayError> {
        if self.positions.contains_key(ticker) {
            warn!(ticker, "Duplicate open attempt rejected");
            return Err(FairwayError::DuplicatePosition {
                ticker: ticker.to_string(),
            });
        }

        let position = Position {
            ticker: ticker.to_string(),
            player: player.to_string(),
            category,
            entry_price,
            entry_edge_pct,
            status: PositionStatus::Open,
            exit_price: None,
            exit_reason: None,
            opened_at: now,
            closed_at: None,
        };

        info!(
            ticker,
            player,
            category = %category,
            entry_price = format!("{entry_price:.0}¢"),
            entry_edge = format!("{entry_edge_pct:+.1}%"),
            "Position opened"
        );
        self.positions.insert(ticker.to_string(), position);

        Ok(PositionEvent::Opened {
            ticker: ticker.to_string(),
            player: player.to_string(),
            category,
            entry_price,
            entry_edge_pct,
        })
    }

    /// Evaluate early-exit conditions for an open position against the
    /// live quote. Returns the exit reason without closing; the caller
    /// decides the exit price. Never fires for non-winner categories.
    ///
    /// Profit target is checked before edge flip, so a position that
    /// qualifies for both closes as a winner.
    pub fn check_exit(
        &self,
        ticker: &str,
        current_yes_bid: f64,
        current_edge_pct: f64,
    ) -> Option<ExitReason> {
        let position = self.positions.get(ticker)?;
        if !position.is_open() || !position.category.is_winner() {
            return None;
        }

        if current_yes_bid >= position.entry_price + self.policy.profit_target {
            return Some(ExitReason::ProfitTarget {
                yes_bid: current_yes_bid,
            });
        }

        if current_edge_pct <= self.policy.edge_flip_threshold {
            return Some(ExitReason::EdgeFlip {
                edge_pct: current_edge_pct,
            });
        }

        None
    }

    /// Close an open position at the given price. Closing is terminal:
    /// a closed position is immutable and errors on any further close.
    pub fn close(
        &mut self,
        ticker: &str,
        exit_price: f64,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<PositionEvent, FairwayError> {
        let position = self.positions.get_mut(ticker).ok_or_else(|| {
            FairwayError::Storage(format!("No position for ticker {ticker}"))
        })?;

        if !position.is_open() {
            return Err(FairwayError::Storage(format!(
                "Position {ticker} already closed"
            )));
        }

        position.status = PositionStatus::Closed;
        position.exit_price = Some(exit_price);
        position.exit_reason = Some(reason.to_string());
        position.closed_at = Some(now);

        let profit_loss = exit_price - position.entry_price;
        info!(
            ticker,
            player = %position.player,
            exit_price = format!("{exit_price:.0}¢"),
            pnl = format!("{profit_loss:+.0}¢"),
            reason = %reason,
            "Position closed"
        );

        Ok(PositionEvent::Closed {
            ticker: ticker.to_string(),
            player: position.player.clone(),
            category: position.category,
            entry_price: position.entry_price,
            exit_price,
            exit_reason: reason,
            profit_loss,
        })
    }

    /// Auto-close an open position at the settlement price: YES → 100¢,
    /// NO → 0¢, VOID → entry price (a push, realized P&L of zero).
    pub fn settle(
        &mut self,
        ticker: &str,
        outcome: SettlementOutcome,
        now: DateTime<Utc>,
    ) -> Result<PositionEvent, FairwayError> {
        let entry_price = self
            .positions
            .get(ticker)
            .map(|p| p.entry_price)
            .ok_or_else(|| FairwayError::Storage(format!("No position for ticker {ticker}")))?;

        let (exit_price, reason) = match outcome {
            SettlementOutcome::Yes => (100.0, ExitReason::SettledYes),
            SettlementOutcome::No => (0.0, ExitReason::SettledNo),
            SettlementOutcome::Void => (entry_price, ExitReason::Voided),
        };

        self.close(ticker, exit_price, reason, now)
    }

    /// All currently open positions.
    pub fn open_positions(&self) -> Vec<&Position> {
        let mut open: Vec<&Position> = self.positions.values().filter(|p| p.is_open()).collect();
        open.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        open
    }

    pub fn get(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn all_positions(&self) -> Vec<&Position> {
        let mut all: Vec<&Position> = self.positions.values().collect();
        all.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        all
    }

    /// Aggregate statistics over the whole ledger.
    pub fn stats(&self, now: DateTime<Utc>) -> LedgerStats {
        let open_count = self.positions.values().filter(|p| p.is_open()).count();
        let closed: Vec<&Position> = self
            .positions
            .values()
            .filter(|p| !p.is_open())
            .collect();

        let closed_count = closed.len();
        let wins = closed
            .iter()
            .filter(|p| p.profit_loss().unwrap_or(0.0) > 0.0)
            .count();
        let total_realized_pnl: f64 = closed.iter().filter_map(|p| p.profit_loss()).sum();
        let total_hold_minutes: i64 = closed
            .iter()
            .map(|p| p.hold_duration(now).num_minutes())
            .sum();

        LedgerStats {
            open_count,
            closed_count,
            win_rate: if closed_count > 0 {
                wins as f64 / closed_count as f64
            } else {
                0.0
            },
            total_realized_pnl,
            avg_hold_minutes: if closed_count > 0 {
                total_hold_minutes as f64 / closed_count as f64
            } else {
                0.0
            },
        }
    }

    /// Snapshot for persistence, sorted for stable output.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        LedgerSnapshot { positions }
    }

    /// Rebuild a ledger from a snapshot.
    pub fn restore(snapshot: LedgerSnapshot, policy: ExitPolicy) -> Self {
        let positions = snapshot
            .positions
            .into_iter()
            .map(|p| (p.ticker.clone(), p))
            .collect();
        Self { positions, policy }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ledger() -> PositionLedger {
        PositionLedger::new(ExitPolicy::default())
    }

    fn open_win(ledger: &mut PositionLedger, ticker: &str, entry: f64) {
        ledger
            .open(ticker, "Scottie Scheffler", MarketCategory::Win, entry, 12.0, Utc::now())
            .unwrap();
    }

    // -- Open / duplicate tests --

    #[test]
    fn test_open_creates_position() {
        let mut ledger = make_ledger();
        let event = ledger
            .open("T1", "Scottie Scheffler", MarketCategory::Win, 22.0, 12.0, Utc::now())
            .unwrap();
        assert!(matches!(event, PositionEvent::Opened { .. }));
        assert_eq!(ledger.open_positions().len(), 1);
        assert!(ledger.get("T1").unwrap().is_open());
    }

    #[test]
    fn test_duplicate_open_rejected() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        let err = ledger
            .open("T1", "Scottie Scheffler", MarketCategory::Win, 25.0, 10.0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, FairwayError::DuplicatePosition { .. }));
        // Original entry untouched
        assert!((ledger.get("T1").unwrap().entry_price - 22.0).abs() < 1e-10);
    }

    #[test]
    fn test_closed_ticker_cannot_reopen() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        ledger
            .close("T1", 40.0, ExitReason::ProfitTarget { yes_bid: 40.0 }, Utc::now())
            .unwrap();
        let err = ledger
            .open("T1", "Scottie Scheffler", MarketCategory::Win, 30.0, 9.0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, FairwayError::DuplicatePosition { .. }));
    }

    // -- Early exit tests --

    #[test]
    fn test_profit_target_at_boundary() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 50.0);

        // Bid 64: one cent short of entry + 15, no exit
        assert!(ledger.check_exit("T1", 64.0, 5.0).is_none());
        // Bid 65: exactly entry + 15, exit fires
        assert_eq!(
            ledger.check_exit("T1", 65.0, 5.0),
            Some(ExitReason::ProfitTarget { yes_bid: 65.0 })
        );
    }

    #[test]
    fn test_edge_flip_at_boundary() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 50.0);

        // Edge -7: above the -8 threshold, no exit
        assert!(ledger.check_exit("T1", 52.0, -7.0).is_none());
        // Edge exactly -8: exit fires
        assert_eq!(
            ledger.check_exit("T1", 52.0, -8.0),
            Some(ExitReason::EdgeFlip { edge_pct: -8.0 })
        );
        // Edge -12: well past the threshold
        assert!(matches!(
            ledger.check_exit("T1", 52.0, -12.0),
            Some(ExitReason::EdgeFlip { .. })
        ));
    }

    #[test]
    fn test_profit_target_wins_when_both_fire() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 50.0);
        assert!(matches!(
            ledger.check_exit("T1", 70.0, -10.0),
            Some(ExitReason::ProfitTarget { .. })
        ));
    }

    #[test]
    fn test_non_winner_never_early_exits() {
        let mut ledger = make_ledger();
        ledger
            .open("T5", "Rory McIlroy", MarketCategory::Top5, 40.0, 10.0, Utc::now())
            .unwrap();

        // Conditions that would close a winner position do nothing here
        assert!(ledger.check_exit("T5", 90.0, 5.0).is_none());
        assert!(ledger.check_exit("T5", 42.0, -20.0).is_none());
    }

    #[test]
    fn test_check_exit_skips_closed() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 50.0);
        ledger
            .close("T1", 70.0, ExitReason::ProfitTarget { yes_bid: 70.0 }, Utc::now())
            .unwrap();
        assert!(ledger.check_exit("T1", 90.0, 10.0).is_none());
    }

    #[test]
    fn test_check_exit_unknown_ticker() {
        let ledger = make_ledger();
        assert!(ledger.check_exit("NOPE", 90.0, 10.0).is_none());
    }

    // -- Close tests --

    #[test]
    fn test_close_records_exit() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        let event = ledger
            .close("T1", 40.0, ExitReason::ProfitTarget { yes_bid: 40.0 }, Utc::now())
            .unwrap();

        match event {
            PositionEvent::Closed { profit_loss, exit_price, .. } => {
                assert!((profit_loss - 18.0).abs() < 1e-10);
                assert!((exit_price - 40.0).abs() < 1e-10);
            }
            other => panic!("expected Closed, got {other:?}"),
        }

        let pos = ledger.get("T1").unwrap();
        assert!(!pos.is_open());
        assert!(pos.closed_at.is_some());
        assert!(pos.exit_reason.as_deref().unwrap().contains("profit target"));
    }

    #[test]
    fn test_double_close_errors() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        ledger
            .close("T1", 40.0, ExitReason::ProfitTarget { yes_bid: 40.0 }, Utc::now())
            .unwrap();
        assert!(ledger
            .close("T1", 45.0, ExitReason::SettledYes, Utc::now())
            .is_err());
    }

    #[test]
    fn test_close_unknown_ticker_errors() {
        let mut ledger = make_ledger();
        assert!(ledger.close("NOPE", 50.0, ExitReason::SettledNo, Utc::now()).is_err());
    }

    // -- Settlement tests --

    #[test]
    fn test_settle_yes_closes_at_100() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        let event = ledger.settle("T1", SettlementOutcome::Yes, Utc::now()).unwrap();
        match event {
            PositionEvent::Closed { exit_price, profit_loss, exit_reason, .. } => {
                assert!((exit_price - 100.0).abs() < 1e-10);
                assert!((profit_loss - 78.0).abs() < 1e-10);
                assert_eq!(exit_reason, ExitReason::SettledYes);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn test_settle_no_closes_at_0() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        let event = ledger.settle("T1", SettlementOutcome::No, Utc::now()).unwrap();
        match event {
            PositionEvent::Closed { exit_price, profit_loss, .. } => {
                assert!(exit_price.abs() < 1e-10);
                assert!((profit_loss - (-22.0)).abs() < 1e-10);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn test_settle_void_is_a_push() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        let event = ledger.settle("T1", SettlementOutcome::Void, Utc::now()).unwrap();
        match event {
            PositionEvent::Closed { exit_price, profit_loss, exit_reason, .. } => {
                assert!((exit_price - 22.0).abs() < 1e-10);
                assert!(profit_loss.abs() < 1e-10);
                assert_eq!(exit_reason, ExitReason::Voided);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn test_settle_applies_to_non_winner_categories() {
        let mut ledger = make_ledger();
        ledger
            .open("T10", "Rory McIlroy", MarketCategory::Top10, 40.0, 9.0, Utc::now())
            .unwrap();
        let event = ledger.settle("T10", SettlementOutcome::Yes, Utc::now()).unwrap();
        assert!(matches!(event, PositionEvent::Closed { .. }));
    }

    // -- Stats tests --

    #[test]
    fn test_stats_empty() {
        let ledger = make_ledger();
        let stats = ledger.stats(Utc::now());
        assert_eq!(stats.open_count, 0);
        assert_eq!(stats.closed_count, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.avg_hold_minutes, 0.0);
    }

    #[test]
    fn test_stats_mixed() {
        let mut ledger = make_ledger();
        let t0 = Utc::now() - chrono::Duration::minutes(120);

        ledger.open("W1", "A", MarketCategory::Win, 20.0, 10.0, t0).unwrap();
        ledger.open("W2", "B", MarketCategory::Win, 30.0, 10.0, t0).unwrap();
        ledger.open("W3", "C", MarketCategory::Win, 40.0, 10.0, t0).unwrap();

        // One winner (+80), one loser (-30), one still open
        ledger.settle("W1", SettlementOutcome::Yes, t0 + chrono::Duration::minutes(60)).unwrap();
        ledger.settle("W2", SettlementOutcome::No, t0 + chrono::Duration::minutes(100)).unwrap();

        let stats = ledger.stats(Utc::now());
        assert_eq!(stats.open_count, 1);
        assert_eq!(stats.closed_count, 2);
        assert!((stats.win_rate - 0.5).abs() < 1e-10);
        assert!((stats.total_realized_pnl - 50.0).abs() < 1e-10);
        assert!((stats.avg_hold_minutes - 80.0).abs() < 1e-10);
    }

    #[test]
    fn test_stats_void_not_a_win() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        ledger.settle("T1", SettlementOutcome::Void, Utc::now()).unwrap();
        let stats = ledger.stats(Utc::now());
        assert_eq!(stats.closed_count, 1);
        assert_eq!(stats.win_rate, 0.0);
    }

    // -- Snapshot tests --

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        ledger.open("T2", "Rory McIlroy", MarketCategory::Top10, 40.0, 9.0, Utc::now()).unwrap();
        ledger.settle("T1", SettlementOutcome::Yes, Utc::now()).unwrap();

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.positions.len(), 2);

        let restored = PositionLedger::restore(snapshot, ExitPolicy::default());
        assert_eq!(restored.open_positions().len(), 1);
        assert!(!restored.get("T1").unwrap().is_open());
        assert!(restored.get("T2").unwrap().is_open());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut ledger = make_ledger();
        open_win(&mut ledger, "T1", 22.0);
        let json = serde_json::to_string(&ledger.snapshot()).unwrap();
        let parsed: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.positions.len(), 1);
        assert_eq!(parsed.positions[0].ticker, "T1");
    }
}
