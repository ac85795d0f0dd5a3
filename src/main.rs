//! FAIRWAY — Golf Prediction Market Edge Scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the position ledger from disk, and runs the main
//! fetch→match→filter→evaluate→monitor loop with graceful shutdown.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use fairway::alerts::{
    format_recommendation, format_sell_alert, AlertGate, TelegramCommands, TelegramNotifier,
};
use fairway::config::AppConfig;
use fairway::dashboard::{self, DashboardState};
use fairway::engine::{BookOdds, CycleEngine, CycleOutcome};
use fairway::evaluator::{AnthropicEvaluator, Evaluator, RuleBasedEvaluator};
use fairway::feeds::{DataGolfClient, KalshiClient};
use fairway::ledger::{ExitPolicy, PositionEvent, PositionLedger};
use fairway::matching::{EditDistanceRatio, NameMatcher};
use fairway::storage::{self, JsonlAudit};
use fairway::strategy::{FilterConfig, KellyConfig, OpportunityFilter};
use fairway::types::Verdict;

const BANNER: &str = r#"
 _____ _    ___ ______        ___ __   __
|  ___/ \  |_ _|  _ \ \      / / \\ \ / /
| |_ / _ \  | || |_) \ \ /\ / / _ \\ V /
|  _/ ___ \ | ||  _ < \ V  V / ___ \| |
|_|/_/   \_\___|_| \_\ \_/\_/_/   \_\_|

  Golf Prediction Market Edge Scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        poll_interval_secs = cfg.agent.poll_interval_secs,
        idle_interval_secs = cfg.agent.idle_interval_secs,
        min_edge_pct = cfg.strategy.min_edge_pct,
        "FAIRWAY starting up"
    );

    // -- Restore or create the ledger --------------------------------------

    let exit_policy = ExitPolicy {
        profit_target: cfg.strategy.profit_target,
        edge_flip_threshold: cfg.strategy.edge_flip_threshold,
    };
    let ledger = match storage::load_ledger(None)? {
        Some(snapshot) => PositionLedger::restore(snapshot, exit_policy.clone()),
        None => PositionLedger::new(exit_policy.clone()),
    };
    info!(open = ledger.open_positions().len(), "Ledger ready");

    // -- Feed clients -------------------------------------------------------

    let datagolf = DataGolfClient::new(AppConfig::resolve_secret(&cfg.feeds.datagolf_key_env)?)?;
    let kalshi_key = AppConfig::resolve_secret(&cfg.feeds.kalshi_key_env)?;
    let kalshi = KalshiClient::new(kalshi_key.clone(), cfg.feeds.kalshi_base_url.clone())?;
    // Separate client instance for settlement lookups inside the engine.
    let settlement = KalshiClient::new(kalshi_key, cfg.feeds.kalshi_base_url.clone())?;

    // -- Evaluator ------------------------------------------------------------

    let evaluator: Box<dyn Evaluator> = match AppConfig::resolve_secret(&cfg.evaluator.api_key_env)
    {
        Ok(api_key) => {
            let anthropic = AnthropicEvaluator::new(
                api_key,
                cfg.evaluator.model.clone(),
                cfg.evaluator.max_tokens,
            )?;
            info!(model = anthropic.model(), "Using LLM evaluator");
            Box::new(anthropic)
        }
        Err(_) => {
            warn!("No evaluator API key configured — using rule-based evaluator");
            Box::new(RuleBasedEvaluator)
        }
    };

    // -- Alerts ---------------------------------------------------------------

    let telegram = build_telegram(&cfg)?;
    let mut commands = build_commands(&cfg)?;
    let mut alert_gate = AlertGate::new(cfg.alerts.cooldown_minutes);

    // -- Engine ---------------------------------------------------------------

    let mut engine = CycleEngine::new(
        NameMatcher::new(cfg.matching.similarity_cutoff, Box::new(EditDistanceRatio)),
        OpportunityFilter::new(FilterConfig {
            min_edge_pct: cfg.strategy.min_edge_pct,
            max_spread: cfg.strategy.max_spread,
        }),
        KellyConfig {
            fraction: cfg.strategy.kelly_fraction,
            max_stake_pct: cfg.strategy.max_stake_pct,
        },
        evaluator,
        Box::new(settlement),
        Box::new(JsonlAudit::default()),
        ledger,
    );

    // -- Dashboard --------------------------------------------------------------

    let dashboard_state = if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new());
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port)?;
        Some(state)
    } else {
        None
    };

    // -- Main loop ----------------------------------------------------------------

    let poll = Duration::from_secs(cfg.agent.poll_interval_secs);
    let idle = Duration::from_secs(cfg.agent.idle_interval_secs);
    let mut current_period = poll;
    let mut interval = tokio::time::interval(current_period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        poll_secs = poll.as_secs(),
        idle_secs = idle.as_secs(),
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_cycle(&datagolf, &kalshi, &mut engine).await {
                    Ok(outcome) => {
                        dispatch_alerts(&outcome, &engine, telegram.as_ref(), &mut alert_gate).await;

                        if let Some(cmds) = commands.as_mut() {
                            if let Err(e) = cmds.poll(engine.ledger(), chrono::Utc::now()).await {
                                warn!(error = %e, "Command poll failed");
                            }
                        }

                        if let Some(state) = &dashboard_state {
                            let positions = engine
                                .ledger()
                                .all_positions()
                                .into_iter()
                                .cloned()
                                .collect();
                            let stats = engine.ledger().stats(chrono::Utc::now());
                            state.record_cycle(&outcome, positions, stats).await;
                        }

                        if let Err(e) = storage::save_ledger(&engine.ledger().snapshot(), None) {
                            error!(error = %e, "Failed to save ledger");
                        }

                        // Slow down between tournaments, speed up when live
                        let desired = if outcome.tournament_active { poll } else { idle };
                        if desired != current_period {
                            info!(secs = desired.as_secs(), "Switching cycle interval");
                            current_period = desired;
                            interval = tokio::time::interval(current_period);
                            interval.set_missed_tick_behavior(
                                tokio::time::MissedTickBehavior::Delay,
                            );
                            // The first tick of a fresh interval fires
                            // immediately; consume it.
                            interval.tick().await;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Cycle failed — continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Save final ledger
    storage::save_ledger(&engine.ledger().snapshot(), None)?;
    let stats = engine.ledger().stats(chrono::Utc::now());
    info!(%stats, "FAIRWAY shut down cleanly.");

    Ok(())
}

/// Run one fetch→process cycle.
async fn run_cycle(
    datagolf: &DataGolfClient,
    kalshi: &KalshiClient,
    engine: &mut CycleEngine,
) -> Result<CycleOutcome> {
    let snapshot = datagolf.fetch_live().await?;

    let markets = if snapshot.tournament_active {
        kalshi.discover_markets().await?
    } else {
        Vec::new()
    };

    // Book odds per category actually quoted this cycle. Failures leave
    // the category absent; validation simply degrades.
    let mut book_odds = BookOdds::new();
    if snapshot.tournament_active {
        let categories: HashSet<_> = markets.iter().map(|m| m.category).collect();
        for category in categories {
            let odds = datagolf.fetch_book_odds(category).await;
            if !odds.is_empty() {
                book_odds.insert(category, odds);
            }
        }
    }

    Ok(engine
        .process_cycle(&snapshot, &markets, &book_odds, chrono::Utc::now())
        .await)
}

/// Send Telegram alerts for the cycle: recommendations for BET verdicts
/// (cooldown-gated per ticker) and exit notices for closed positions.
async fn dispatch_alerts(
    outcome: &CycleOutcome,
    engine: &CycleEngine,
    telegram: Option<&TelegramNotifier>,
    gate: &mut AlertGate,
) {
    let Some(telegram) = telegram else {
        return;
    };
    let now = chrono::Utc::now();

    for record in &outcome.decisions {
        if record.decision.verdict != Verdict::Bet {
            continue;
        }
        if !gate.ready(&record.opportunity.ticker, now) {
            continue;
        }
        let message = format_recommendation(
            &record.opportunity,
            &record.decision,
            record.yes_ask,
            record.yes_bid,
            record.context.leaderboard.as_ref(),
            record.context.validation.as_ref(),
            record.context.stake.as_ref(),
        );
        match telegram.send(&message).await {
            Ok(()) => gate.mark_sent(&record.opportunity.ticker, now),
            Err(e) => warn!(ticker = %record.opportunity.ticker, error = %e, "Alert failed"),
        }
    }

    for event in &outcome.position_events {
        let PositionEvent::Closed { ticker, exit_reason, .. } = event else {
            continue;
        };
        let Some(position) = engine.ledger().get(ticker) else {
            continue;
        };
        let message = format_sell_alert(position, exit_reason);
        if let Err(e) = telegram.send(&message).await {
            warn!(ticker, error = %e, "Exit alert failed");
        }
    }
}

/// Build the Telegram notifier when both env vars resolve.
fn build_telegram(cfg: &AppConfig) -> Result<Option<TelegramNotifier>> {
    let (Some(token_env), Some(chat_env)) = (
        cfg.alerts.telegram_bot_token_env.as_deref(),
        cfg.alerts.telegram_chat_id_env.as_deref(),
    ) else {
        info!("Telegram not configured — alerts disabled");
        return Ok(None);
    };

    match (
        AppConfig::resolve_secret(token_env),
        AppConfig::resolve_env(chat_env),
    ) {
        (Ok(token), Ok(chat_id)) => {
            info!("Telegram alerts enabled");
            Ok(Some(TelegramNotifier::new(token, chat_id)?))
        }
        _ => {
            warn!("Telegram env vars not set — alerts disabled");
            Ok(None)
        }
    }
}

/// Build the command poller over the same env vars as the notifier.
fn build_commands(cfg: &AppConfig) -> Result<Option<TelegramCommands>> {
    let (Some(token_env), Some(chat_env)) = (
        cfg.alerts.telegram_bot_token_env.as_deref(),
        cfg.alerts.telegram_chat_id_env.as_deref(),
    ) else {
        return Ok(None);
    };

    match (
        AppConfig::resolve_secret(token_env),
        AppConfig::resolve_env(chat_env),
    ) {
        (Ok(token), Ok(chat_id)) => {
            let kelly = KellyConfig {
                fraction: cfg.strategy.kelly_fraction,
                max_stake_pct: cfg.strategy.max_stake_pct,
            };
            Ok(Some(TelegramCommands::new(token, chat_id, kelly)?))
        }
        _ => Ok(None),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fairway=info"));

    let json_logging = std::env::var("FAIRWAY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
