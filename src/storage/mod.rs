//! Persistence layer.
//!
//! The position ledger snapshots to a JSON file so restarts pick up
//! open positions mid-tournament. Cycle activity (opportunities,
//! decisions, position events) appends to a JSONL audit log for later
//! review.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::ledger::{LedgerSnapshot, PositionEvent};
use crate::strategy::{EdgeValidation, StakeRecommendation};
use crate::types::{Decision, Opportunity};

/// Default ledger snapshot path.
const DEFAULT_LEDGER_FILE: &str = "fairway_ledger.json";

/// Default audit log path.
pub const DEFAULT_AUDIT_FILE: &str = "fairway_audit.jsonl";

// ---------------------------------------------------------------------------
// Ledger snapshot persistence
// ---------------------------------------------------------------------------

/// Save the ledger snapshot to a JSON file.
pub fn save_ledger(snapshot: &LedgerSnapshot, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);
    let json = serde_json::to_string_pretty(snapshot)
        .context("Failed to serialise ledger snapshot")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write ledger to {path}"))?;

    debug!(path, positions = snapshot.positions.len(), "Ledger saved");
    Ok(())
}

/// Load the ledger snapshot from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_ledger(path: Option<&str>) -> Result<Option<LedgerSnapshot>> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved ledger found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read ledger from {path}"))?;

    let snapshot: LedgerSnapshot = serde_json::from_str(&json)
        .context(format!("Failed to parse ledger from {path}"))?;

    info!(path, positions = snapshot.positions.len(), "Ledger loaded from disk");
    Ok(Some(snapshot))
}

/// Delete the ledger file (for testing or reset).
pub fn delete_ledger(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete ledger file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Opportunity {
        at: DateTime<Utc>,
        opportunity: Opportunity,
    },
    Decision {
        at: DateTime<Utc>,
        ticker: String,
        evaluator: String,
        decision: Decision,
        /// Book cross-check shown to the evaluator, when a book quoted
        /// the player.
        validation: Option<EdgeValidation>,
        /// Kelly sizing shown to the evaluator.
        stake: Option<StakeRecommendation>,
    },
    PositionEvent {
        at: DateTime<Utc>,
        event: PositionEvent,
    },
}

/// Append-only sink for cycle activity.
pub trait AuditSink: Send + Sync {
    fn record_opportunity(&self, opportunity: &Opportunity) -> Result<()>;
    fn record_decision(
        &self,
        ticker: &str,
        evaluator: &str,
        decision: &Decision,
        validation: Option<&EdgeValidation>,
        stake: Option<&StakeRecommendation>,
    ) -> Result<()>;
    fn record_position_event(&self, event: &PositionEvent) -> Result<()>;
}

/// JSONL-backed audit log, one record per line.
pub struct JsonlAudit {
    path: String,
}

impl JsonlAudit {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .context("Failed to serialise audit record")?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open audit log {}", self.path))?;

        writeln!(file, "{line}")
            .context(format!("Failed to append to audit log {}", self.path))?;
        Ok(())
    }
}

impl Default for JsonlAudit {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_FILE)
    }
}

impl AuditSink for JsonlAudit {
    fn record_opportunity(&self, opportunity: &Opportunity) -> Result<()> {
        self.append(&AuditRecord::Opportunity {
            at: Utc::now(),
            opportunity: opportunity.clone(),
        })
    }

    fn record_decision(
        &self,
        ticker: &str,
        evaluator: &str,
        decision: &Decision,
        validation: Option<&EdgeValidation>,
        stake: Option<&StakeRecommendation>,
    ) -> Result<()> {
        self.append(&AuditRecord::Decision {
            at: Utc::now(),
            ticker: ticker.to_string(),
            evaluator: evaluator.to_string(),
            decision: decision.clone(),
            validation: validation.cloned(),
            stake: stake.copied(),
        })
    }

    fn record_position_event(&self, event: &PositionEvent) -> Result<()> {
        self.append(&AuditRecord::PositionEvent {
            at: Utc::now(),
            event: event.clone(),
        })
    }
}

/// Discards everything. Used in tests and when auditing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record_opportunity(&self, _opportunity: &Opportunity) -> Result<()> {
        Ok(())
    }

    fn record_decision(
        &self,
        _ticker: &str,
        _evaluator: &str,
        _decision: &Decision,
        _validation: Option<&EdgeValidation>,
        _stake: Option<&StakeRecommendation>,
    ) -> Result<()> {
        Ok(())
    }

    fn record_position_event(&self, _event: &PositionEvent) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ExitPolicy, PositionLedger};
    use crate::types::{MarketCategory, Verdict};
    use uuid::Uuid;

    fn temp_path(suffix: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("fairway_test_{}_{suffix}", Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn populated_snapshot() -> LedgerSnapshot {
        let mut ledger = PositionLedger::new(ExitPolicy::default());
        ledger
            .open(
                "KXPGATOUR-25AUG-SSCHEF",
                "Scottie Scheffler",
                MarketCategory::Win,
                22.0,
                12.0,
                Utc::now(),
            )
            .unwrap();
        ledger.snapshot()
    }

    #[test]
    fn test_save_and_load_ledger() {
        let path = temp_path("ledger.json");
        let snapshot = populated_snapshot();
        save_ledger(&snapshot, Some(&path)).unwrap();

        let loaded = load_ledger(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.positions.len(), 1);
        assert_eq!(loaded.positions[0].player, "Scottie Scheffler");
        assert!((loaded.positions[0].entry_price - 22.0).abs() < 1e-10);

        delete_ledger(Some(&path)).unwrap();
    }

    #[test]
    fn test_load_nonexistent_ledger() {
        let loaded = load_ledger(Some("/tmp/fairway_nonexistent_ledger_12345.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_delete_ledger() {
        let path = temp_path("ledger.json");
        save_ledger(&populated_snapshot(), Some(&path)).unwrap();
        assert!(Path::new(&path).exists());

        delete_ledger(Some(&path)).unwrap();
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_delete_nonexistent_ok() {
        assert!(delete_ledger(Some("/tmp/fairway_does_not_exist_xyz.json")).is_ok());
    }

    #[test]
    fn test_jsonl_audit_appends_lines() {
        let path = temp_path("audit.jsonl");
        let audit = JsonlAudit::new(&path);

        let opportunity = Opportunity {
            id: Uuid::new_v4(),
            ticker: "T1".into(),
            player: "Rory McIlroy".into(),
            category: MarketCategory::Top10,
            model_prob: 0.72,
            implied_prob: 0.60,
            edge_pct: 12.0,
            spread: 5.0,
            detected_at: Utc::now(),
        };
        let decision = Decision {
            verdict: Verdict::Bet,
            confidence: 0.7,
            suggested_stake_pct: 1.5,
            reasoning: "test".into(),
        };

        audit.record_opportunity(&opportunity).unwrap();
        audit
            .record_decision("T1", "rule-based", &decision, None, None)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert!(matches!(first, AuditRecord::Opportunity { .. }));
        let second: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        match second {
            AuditRecord::Decision { ticker, evaluator, validation, stake, .. } => {
                assert_eq!(ticker, "T1");
                assert_eq!(evaluator, "rule-based");
                assert!(validation.is_none());
                assert!(stake.is_none());
            }
            other => panic!("Expected decision record, got {other:?}"),
        }

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_decision_record_carries_sizing_context() {
        let path = temp_path("audit_ctx.jsonl");
        let audit = JsonlAudit::new(&path);

        let decision = Decision {
            verdict: Verdict::Bet,
            confidence: 0.7,
            suggested_stake_pct: 1.5,
            reasoning: "test".into(),
        };
        let validation = crate::strategy::validate_edge(
            0.34,
            0.22,
            &[("pinnacle".to_string(), 0.28)].into_iter().collect(),
        );
        let stake = crate::strategy::recommend(0.34, 22.0, &crate::strategy::KellyConfig::default());

        audit
            .record_decision("T1", "anthropic", &decision, Some(&validation), Some(&stake))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let record: AuditRecord = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        match record {
            AuditRecord::Decision { validation, stake, .. } => {
                let v = validation.expect("validation serialized");
                assert!((v.edge_vs_pinnacle.unwrap() - 6.0).abs() < 1e-9);
                let s = stake.expect("stake serialized");
                assert!(s.is_positive_ev);
                assert!(s.stake_pct > 0.0);
            }
            other => panic!("Expected decision record, got {other:?}"),
        }

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_null_audit_never_errors() {
        let audit = NullAudit;
        let decision = Decision {
            verdict: Verdict::Pass,
            confidence: 0.2,
            suggested_stake_pct: 0.0,
            reasoning: "test".into(),
        };
        assert!(audit
            .record_decision("T1", "rule-based", &decision, None, None)
            .is_ok());
    }
}
