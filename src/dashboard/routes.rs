//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`
//! and refreshed by the main loop after every cycle.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::CycleOutcome;
use crate::ledger::LedgerStats;
use crate::types::{Opportunity, Position};

/// Entries kept in the rolling cycle and opportunity logs.
const LOG_CAPACITY: usize = 200;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub started_at: DateTime<Utc>,
    pub tournament_active: RwLock<bool>,
    pub cycle_count: RwLock<u64>,
    pub positions: RwLock<Vec<Position>>,
    pub recent_opportunities: RwLock<Vec<Opportunity>>,
    pub cycle_log: RwLock<Vec<CycleLogEntry>>,
    pub ledger_stats: RwLock<LedgerStats>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            tournament_active: RwLock::new(false),
            cycle_count: RwLock::new(0),
            positions: RwLock::new(Vec::new()),
            recent_opportunities: RwLock::new(Vec::new()),
            cycle_log: RwLock::new(Vec::new()),
            ledger_stats: RwLock::new(LedgerStats {
                open_count: 0,
                closed_count: 0,
                win_rate: 0.0,
                total_realized_pnl: 0.0,
                avg_hold_minutes: 0.0,
            }),
        }
    }

    /// Fold one cycle's outcome into the dashboard.
    pub async fn record_cycle(
        &self,
        outcome: &CycleOutcome,
        positions: Vec<Position>,
        stats: LedgerStats,
    ) {
        *self.tournament_active.write().await = outcome.tournament_active;

        let cycle_number = {
            let mut count = self.cycle_count.write().await;
            *count += 1;
            *count
        };

        {
            let mut log = self.cycle_log.write().await;
            log.push(CycleLogEntry {
                cycle_number,
                timestamp: Utc::now().to_rfc3339(),
                tournament_active: outcome.tournament_active,
                round: outcome.round,
                min_edge_pct: outcome.min_edge_pct,
                markets_seen: outcome.markets_seen,
                opportunities: outcome.opportunities.len(),
                rejections: outcome.rejections.len(),
                unmatched: outcome.unmatched,
                position_events: outcome.position_events.len(),
            });
            if log.len() > LOG_CAPACITY {
                let excess = log.len() - LOG_CAPACITY;
                log.drain(..excess);
            }
        }

        {
            let mut recent = self.recent_opportunities.write().await;
            recent.extend(outcome.opportunities.iter().cloned());
            if recent.len() > LOG_CAPACITY {
                let excess = recent.len() - LOG_CAPACITY;
                recent.drain(..excess);
            }
        }

        *self.positions.write().await = positions;
        *self.ledger_stats.write().await = stats;
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub tournament_active: bool,
    pub cycle_count: u64,
    pub open_positions: usize,
    pub closed_positions: usize,
    pub win_rate: f64,
    pub total_realized_pnl: f64,
    pub avg_hold_minutes: f64,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleLogEntry {
    pub cycle_number: u64,
    pub timestamp: String,
    pub tournament_active: bool,
    pub round: u32,
    pub min_edge_pct: f64,
    pub markets_seen: usize,
    pub opportunities: usize,
    pub rejections: usize,
    pub unmatched: usize,
    pub position_events: usize,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.ledger_stats.read().await;
    Json(StatusResponse {
        tournament_active: *state.tournament_active.read().await,
        cycle_count: *state.cycle_count.read().await,
        open_positions: stats.open_count,
        closed_positions: stats.closed_count,
        win_rate: stats.win_rate,
        total_realized_pnl: stats.total_realized_pnl,
        avg_hold_minutes: stats.avg_hold_minutes,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/positions
pub async fn get_positions(State(state): State<AppState>) -> Json<Vec<Position>> {
    Json(state.positions.read().await.clone())
}

/// GET /api/opportunities
pub async fn get_opportunities(State(state): State<AppState>) -> Json<Vec<Opportunity>> {
    Json(state.recent_opportunities.read().await.clone())
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleLogEntry>> {
    let log = state.cycle_log.read().await;
    let start = log.len().saturating_sub(100);
    Json(log[start..].to_vec())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
