//! Cycle orchestrator.
//!
//! One `process_cycle` call takes a model snapshot plus discovered
//! markets and runs the full pipeline: reconcile identities, compute
//! edges, gate through the filter, evaluate survivors, open positions
//! on BET verdicts, then sweep open positions for early exits and
//! settlements. Feed fetching stays outside so the engine is pure with
//! respect to HTTP.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::evaluator::{EvaluationContext, Evaluator, RuleBasedEvaluator};
use crate::feeds::{LiveSnapshot, SettlementSource};
use crate::ledger::{PositionEvent, PositionLedger};
use crate::matching::NameMatcher;
use crate::storage::AuditSink;
use crate::strategy::{
    self, recommend, validate_edge, KellyConfig, OpportunityFilter, RejectReason,
};
use crate::types::{
    Decision, MarketCategory, MarketQuote, Opportunity, ProbabilityQuote, Verdict,
};

/// Per-book implied probabilities, keyed category → player → book.
pub type BookOdds = HashMap<MarketCategory, HashMap<String, HashMap<String, f64>>>;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// One evaluated opportunity and everything needed to alert on it.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub opportunity: Opportunity,
    pub decision: Decision,
    /// Name of the evaluator that produced the decision.
    pub evaluator: String,
    pub yes_ask: f64,
    pub yes_bid: f64,
    pub context: EvaluationContext,
}

/// Summary of one processing cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub tournament_active: bool,
    pub markets_seen: usize,
    pub players_seen: usize,
    /// Consensus tournament round this cycle, 0 when unknown.
    pub round: u32,
    /// Round-adjusted minimum edge applied this cycle.
    pub min_edge_pct: f64,
    pub opportunities: Vec<Opportunity>,
    pub decisions: Vec<DecisionRecord>,
    pub rejections: Vec<(String, RejectReason)>,
    /// Markets with no identity match in the model catalog.
    pub unmatched: usize,
    pub position_events: Vec<PositionEvent>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct CycleEngine {
    matcher: NameMatcher,
    filter: OpportunityFilter,
    kelly: KellyConfig,
    evaluator: Box<dyn Evaluator>,
    fallback: RuleBasedEvaluator,
    settlement: Box<dyn SettlementSource>,
    audit: Box<dyn AuditSink>,
    ledger: PositionLedger,
}

impl CycleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        matcher: NameMatcher,
        filter: OpportunityFilter,
        kelly: KellyConfig,
        evaluator: Box<dyn Evaluator>,
        settlement: Box<dyn SettlementSource>,
        audit: Box<dyn AuditSink>,
        ledger: PositionLedger,
    ) -> Self {
        Self {
            matcher,
            filter,
            kelly,
            evaluator,
            fallback: RuleBasedEvaluator,
            settlement,
            audit,
            ledger,
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Run one full cycle.
    pub async fn process_cycle(
        &mut self,
        snapshot: &LiveSnapshot,
        markets: &[MarketQuote],
        book_odds: &BookOdds,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let mut outcome = CycleOutcome {
            tournament_active: snapshot.tournament_active,
            markets_seen: markets.len(),
            players_seen: snapshot.leaderboard.len(),
            ..Default::default()
        };

        let index = CatalogIndex::build(snapshot);
        outcome.round = index.round;
        // The filter's configured minimum is the base the round schedule
        // scales each cycle.
        outcome.min_edge_pct =
            strategy::min_edge_for_round(self.filter.config().min_edge_pct, index.round);

        if snapshot.tournament_active {
            self.scan_markets(snapshot, markets, book_odds, &index, now, &mut outcome)
                .await;
        } else {
            debug!("No live tournament, skipping market scan");
        }

        self.monitor_positions(markets, &index, now, &mut outcome).await;

        info!(
            round = outcome.round,
            markets = outcome.markets_seen,
            opportunities = outcome.opportunities.len(),
            decisions = outcome.decisions.len(),
            rejections = outcome.rejections.len(),
            unmatched = outcome.unmatched,
            position_events = outcome.position_events.len(),
            "Cycle complete"
        );
        outcome
    }

    async fn scan_markets(
        &mut self,
        snapshot: &LiveSnapshot,
        markets: &[MarketQuote],
        book_odds: &BookOdds,
        index: &CatalogIndex,
        now: DateTime<Utc>,
        outcome: &mut CycleOutcome,
    ) {
        for market in markets {
            if !market.is_eligible() {
                outcome
                    .rejections
                    .push((market.ticker.clone(), RejectReason::NoLiquidity));
                continue;
            }

            let Some(pair) = self.matcher.reconcile(market, &index.players, |player| {
                index.quote(player, market.category)
            }) else {
                outcome.unmatched += 1;
                continue;
            };

            let eval = strategy::evaluate(pair.probability.probability, market);
            let standing = snapshot.leaderboard.get(&pair.probability.player);

            let opportunity = match self.filter.check(
                &pair,
                &eval,
                outcome.min_edge_pct,
                standing,
                now,
            ) {
                Ok(opp) => opp,
                Err(reason) => {
                    debug!(ticker = %market.ticker, %reason, "Market rejected");
                    outcome.rejections.push((market.ticker.clone(), reason));
                    continue;
                }
            };

            if let Err(e) = self.audit.record_opportunity(&opportunity) {
                warn!(error = %e, "Audit write failed");
            }
            outcome.opportunities.push(opportunity.clone());

            let context = self.build_context(&opportunity, snapshot, book_odds, index.round);
            let (mut decision, evaluator_name) = self.decide(&opportunity, &context).await;
            decision.confidence =
                strategy::adjust_confidence_for_round(decision.confidence, index.round);

            if let Err(e) = self.audit.record_decision(
                &opportunity.ticker,
                &evaluator_name,
                &decision,
                context.validation.as_ref(),
                context.stake.as_ref(),
            ) {
                warn!(error = %e, "Audit write failed");
            }

            if decision.verdict == Verdict::Bet {
                let event = match self.ledger.open(
                    &opportunity.ticker,
                    &opportunity.player,
                    opportunity.category,
                    market.yes_ask,
                    opportunity.edge_pct,
                    now,
                ) {
                    Ok(event) => event,
                    Err(_) => PositionEvent::DuplicateRejected {
                        ticker: opportunity.ticker.clone(),
                    },
                };
                self.record_position_event(event, outcome);
            }

            outcome.decisions.push(DecisionRecord {
                opportunity,
                decision,
                evaluator: evaluator_name,
                yes_ask: market.yes_ask,
                yes_bid: market.yes_bid,
                context,
            });
        }
    }

    fn build_context(
        &self,
        opportunity: &Opportunity,
        snapshot: &LiveSnapshot,
        book_odds: &BookOdds,
        round: u32,
    ) -> EvaluationContext {
        let validation = book_odds
            .get(&opportunity.category)
            .and_then(|by_player| by_player.get(&opportunity.player))
            .map(|books| validate_edge(opportunity.model_prob, opportunity.implied_prob, books));

        // Kelly sizing needs the entry price in cents.
        let stake = recommend(
            opportunity.model_prob,
            opportunity.implied_prob * 100.0,
            &self.kelly,
        );

        EvaluationContext {
            leaderboard: snapshot.leaderboard.get(&opportunity.player).cloned(),
            validation,
            stake: Some(stake),
            round,
        }
    }

    /// Ask the primary evaluator; fall back to the deterministic rule on
    /// any error so a dead API never stalls the cycle.
    async fn decide(
        &self,
        opportunity: &Opportunity,
        context: &EvaluationContext,
    ) -> (Decision, String) {
        match self.evaluator.decide(opportunity, context).await {
            Ok(decision) => (decision, self.evaluator.name().to_string()),
            Err(e) => {
                warn!(
                    ticker = %opportunity.ticker,
                    evaluator = self.evaluator.name(),
                    error = %e,
                    "Evaluator failed, using rule-based fallback"
                );
                let decision = self
                    .fallback
                    .decide(opportunity, context)
                    .await
                    .unwrap_or_else(|_| Decision {
                        verdict: Verdict::Pass,
                        confidence: 0.0,
                        suggested_stake_pct: 0.0,
                        reasoning: "Evaluator unavailable".to_string(),
                    });
                (decision, self.fallback.name().to_string())
            }
        }
    }

    /// Sweep open positions: early exits against live quotes, settlement
    /// lookups for tickers discovery no longer returns.
    async fn monitor_positions(
        &mut self,
        markets: &[MarketQuote],
        index: &CatalogIndex,
        now: DateTime<Utc>,
        outcome: &mut CycleOutcome,
    ) {
        let quotes: HashMap<&str, &MarketQuote> =
            markets.iter().map(|m| (m.ticker.as_str(), m)).collect();

        let open: Vec<(String, String, MarketCategory)> = self
            .ledger
            .open_positions()
            .iter()
            .map(|p| (p.ticker.clone(), p.player.clone(), p.category))
            .collect();

        for (ticker, player, category) in open {
            match quotes.get(ticker.as_str()) {
                Some(market) => {
                    // Edge flip needs the current model probability. A
                    // player missing from the snapshot contributes no
                    // flip signal this cycle.
                    let current_edge = index
                        .quote(&player, category)
                        .map(|q| (q.probability - market.implied_probability()) * 100.0)
                        .unwrap_or(0.0);

                    if let Some(reason) = self.ledger.check_exit(&ticker, market.yes_bid, current_edge) {
                        match self.ledger.close(&ticker, market.yes_bid, reason, now) {
                            Ok(event) => self.record_position_event(event, outcome),
                            Err(e) => warn!(ticker, error = %e, "Close failed"),
                        }
                    }
                }
                None => {
                    let event = match self.settlement.fetch_settlement(&ticker).await {
                        Ok(Some(settlement)) => {
                            match self.ledger.settle(&ticker, settlement, now) {
                                Ok(event) => Some(event),
                                Err(e) => {
                                    warn!(ticker, error = %e, "Settlement close failed");
                                    None
                                }
                            }
                        }
                        Ok(None) => None,
                        Err(e) => {
                            warn!(ticker, error = %e, "Settlement lookup failed");
                            Some(PositionEvent::SettlementPending { ticker: ticker.clone() })
                        }
                    };
                    if let Some(event) = event {
                        self.record_position_event(event, outcome);
                    }
                }
            }
        }
    }

    fn record_position_event(&self, event: PositionEvent, outcome: &mut CycleOutcome) {
        if let Err(e) = self.audit.record_position_event(&event) {
            warn!(error = %e, "Audit write failed");
        }
        outcome.position_events.push(event);
    }
}

// ---------------------------------------------------------------------------
// Catalog index
// ---------------------------------------------------------------------------

/// Cycle-local index over the model snapshot: sorted player names for
/// deterministic matching, and (player, category) quote lookup.
struct CatalogIndex {
    players: Vec<String>,
    quotes: HashMap<(String, MarketCategory), ProbabilityQuote>,
    round: u32,
}

impl CatalogIndex {
    fn build(snapshot: &LiveSnapshot) -> Self {
        let mut players: Vec<String> = snapshot
            .leaderboard
            .keys()
            .cloned()
            .collect();
        players.sort();
        players.dedup();

        let quotes = snapshot
            .quotes
            .iter()
            .map(|q| ((q.player.clone(), q.category), q.clone()))
            .collect();

        // Consensus round: the most common round number on the
        // leaderboard, so one early or late group doesn't skew it.
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for entry in snapshot.leaderboard.values() {
            *counts.entry(entry.round_number).or_insert(0) += 1;
        }
        let round = counts
            .into_iter()
            .max_by_key(|&(round, count)| (count, round))
            .map(|(round, _)| round)
            .unwrap_or(0);

        Self {
            players,
            quotes,
            round,
        }
    }

    fn quote(&self, player: &str, category: MarketCategory) -> Option<ProbabilityQuote> {
        self.quotes.get(&(player.to_string(), category)).cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
