//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub matching: MatchingConfig,
    pub strategy: StrategyConfig,
    pub evaluator: EvaluatorConfig,
    pub feeds: FeedsConfig,
    pub alerts: AlertsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Seconds between cycles while a tournament is live.
    pub poll_interval_secs: u64,
    /// Seconds between cycles when nothing is in play.
    pub idle_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    pub similarity_cutoff: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub min_edge_pct: f64,
    pub max_spread: f64,
    pub profit_target: f64,
    pub edge_flip_threshold: f64,
    pub kelly_fraction: f64,
    pub max_stake_pct: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluatorConfig {
    /// Env var naming the LLM API key. Unset key means the rule-based
    /// evaluator runs alone.
    pub api_key_env: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedsConfig {
    pub datagolf_key_env: String,
    pub kalshi_key_env: String,
    pub kalshi_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
    pub cooldown_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a secret env var, wrapping the value so it never appears
    /// in logs or debug output.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Ok(SecretString::new(Self::resolve_env(env_name)?))
    }
}
