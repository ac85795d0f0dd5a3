//! Anthropic Claude evaluator.
//!
//! Implements the `Evaluator` trait via the Anthropic Messages API.
//! Handles prompt construction, JSON decision parsing, and rate limiting
//! with exponential backoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{EvaluationContext, Evaluator};
use crate::types::{Decision, Opportunity, Verdict};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// The JSON object the model is instructed to return.
#[derive(Debug, Deserialize)]
struct RawDecision {
    decision: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    suggested_stake_pct: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicEvaluator {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

impl AnthropicEvaluator {
    pub fn new(api_key: SecretString, model: Option<String>, max_tokens: Option<u32>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build Anthropic HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a messages request with retry + backoff.
    async fn call_api(&self, system: &str, user_message: &str) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message.to_string(),
            }],
            system: Some(system.to_string()),
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Anthropic API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self.http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: MessagesResponse = response.json().await
                            .context("Failed to parse Anthropic response")?;

                        let text = body.content.iter()
                            .filter(|b| b.content_type == "text")
                            .filter_map(|b| b.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("");

                        return Ok(text);
                    }

                    // Retryable errors: 429 (rate limit), 500+, 529 (overloaded)
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %error_text, "Retryable Anthropic API error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    // Non-retryable error
                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Anthropic API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Anthropic request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        anyhow::bail!(
            "Anthropic API failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_default()
        )
    }

    /// System prompt for the golf market analyst role.
    pub fn system_prompt() -> &'static str {
        "You are a disciplined golf betting analyst evaluating live mispricings \
         between a statistical model and a prediction market.\n\n\
         RULES:\n\
         1. The model probability comes from live scoring data; the market price \
            is what traders will actually pay. Judge whether the gap is real edge \
            or stale information.\n\
         2. Weight the leaderboard context: position, round, and holes remaining \
            change how much a probability can still move.\n\
         3. Respect the sportsbook cross-check when provided. If sharp books \
            disagree with the model, be skeptical.\n\
         4. Default to PASS or WATCH. BET only when the edge is genuine and the \
            price is still actionable.\n\
         5. Reply with ONLY a JSON object, no other text:\n\
            {\"decision\": \"BET|PASS|WATCH\", \"confidence\": 0.0-1.0, \
            \"suggested_stake_pct\": 0.0-5.0, \"reasoning\": \"one or two sentences\"}"
    }

    /// Build the user prompt for one opportunity.
    pub fn build_prompt(opportunity: &Opportunity, context: &EvaluationContext) -> String {
        let mut prompt = String::with_capacity(1500);

        prompt.push_str(&format!(
            "PLAYER: {}\nMARKET: {} ({})\n",
            opportunity.player, opportunity.category, opportunity.ticker,
        ));
        prompt.push_str(&format!(
            "MODEL PROBABILITY: {:.1}%\nMARKET IMPLIED (ask): {:.1}%\nEDGE: {:+.1}%\nSPREAD: {:.0}¢\n",
            opportunity.model_prob * 100.0,
            opportunity.implied_prob * 100.0,
            opportunity.edge_pct,
            opportunity.spread,
        ));

        if context.round > 0 {
            prompt.push_str(&format!("TOURNAMENT ROUND: {}\n", context.round));
        }

        if let Some(lb) = &context.leaderboard {
            prompt.push_str(&format!(
                "LEADERBOARD: position {} at {:+}, round {}, thru {} ({} holes remaining)\n",
                lb.position, lb.score_to_par, lb.round_number, lb.thru, lb.holes_remaining,
            ));
        }

        if let Some(v) = &context.validation {
            prompt.push_str(&format!(
                "BOOK CROSS-CHECK: {} ({} books",
                v.confidence, v.books_available,
            ));
            if let Some(p) = v.edge_vs_pinnacle {
                prompt.push_str(&format!(", vs pinnacle {p:+.1}%"));
            }
            if let Some(c) = v.edge_vs_consensus {
                prompt.push_str(&format!(", vs consensus {c:+.1}%"));
            }
            prompt.push_str(")\n");
        }

        if let Some(s) = &context.stake {
            prompt.push_str(&format!(
                "KELLY SIZING: {:.2}% of bankroll (breakeven {:.1}%, edge over breakeven {:+.1}%)\n",
                s.stake_pct,
                s.breakeven_prob * 100.0,
                s.edge_over_breakeven * 100.0,
            ));
        }

        prompt.push_str("\nEvaluate and reply with the JSON object.\n");
        prompt
    }

    /// Parse the model's reply into a `Decision`. Tolerates markdown code
    /// fences and leading/trailing prose around the JSON object.
    pub fn parse_decision(text: &str) -> Result<Decision> {
        let json_str = extract_json_object(text)
            .ok_or_else(|| anyhow::anyhow!("No JSON object in evaluator response"))?;

        let raw: RawDecision = serde_json::from_str(json_str)
            .context("Failed to parse evaluator JSON")?;

        let verdict: Verdict = raw.decision.parse()
            .context("Evaluator returned an unknown decision")?;

        Ok(Decision {
            verdict,
            confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            suggested_stake_pct: raw.suggested_stake_pct.unwrap_or(0.0).clamp(0.0, 5.0),
            reasoning: raw.reasoning.unwrap_or_default(),
        })
    }
}

/// Find the first balanced `{ ... }` object in the text, skipping any
/// ``` fences the model wraps around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Evaluator implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Evaluator for AnthropicEvaluator {
    async fn decide(
        &self,
        opportunity: &Opportunity,
        context: &EvaluationContext,
    ) -> Result<Decision> {
        let system = Self::system_prompt();
        let user_msg = Self::build_prompt(opportunity, context);

        debug!(
            ticker = %opportunity.ticker,
            model = %self.model,
            "Requesting evaluator decision"
        );

        let response_text = self.call_api(system, &user_msg).await
            .context("Anthropic API call failed")?;

        let mut decision = Self::parse_decision(&response_text)
            .context("Failed to parse decision from evaluator response")?;

        // Kelly overrides the model's stake when the bet is positive EV:
        // the model is good at direction, not sizing.
        if decision.verdict == Verdict::Bet {
            if let Some(stake) = &context.stake {
                if stake.is_positive_ev {
                    decision.suggested_stake_pct = stake.stake_pct;
                }
            }
        }

        info!(
            ticker = %opportunity.ticker,
            verdict = %decision.verdict,
            confidence = format!("{:.0}%", decision.confidence * 100.0),
            stake = format!("{:.2}%", decision.suggested_stake_pct),
            "Evaluator decision"
        );

        Ok(decision)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
