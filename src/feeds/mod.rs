//! External feed clients.
//!
//! `datagolf` supplies the model side (live probabilities, leaderboard,
//! sportsbook odds); `kalshi` supplies the market side (quote discovery
//! and settlement lookup). Both degrade gracefully: a dead feed makes
//! the cycle idle, never crash.

pub mod datagolf;
pub mod kalshi;

use anyhow::Result;
use async_trait::async_trait;

use crate::ledger::SettlementOutcome;

/// Definitive-result lookup for a market ticker.
///
/// Returns `Ok(None)` while the market has not finalized; errors mean
/// the lookup itself failed and should be retried next cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementSource: Send + Sync {
    async fn fetch_settlement(&self, ticker: &str) -> Result<Option<SettlementOutcome>>;
}

pub use datagolf::{DataGolfClient, LiveSnapshot};
pub use kalshi::KalshiClient;
