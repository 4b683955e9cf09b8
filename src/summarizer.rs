//! LLM-backed narrative summaries of a window's posts, behind a sliding-window
//! rate limiter. The summarizer is optional: without OPENAI_API_KEY the
//! endpoint reports a configuration error and the rest of the service is
//! unaffected.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use tracing::info;

use crate::clock::parse_timestamp_ms;
use crate::config::{
    Config, MAX_SUMMARY_CHARS, MAX_SUMMARY_POSTS, OPENAI_API_URL, REQUEST_TIMEOUT_SECS,
    SUMMARY_RATE_MAX_CALLS, SUMMARY_RATE_WINDOW_MS,
};
use crate::error::{AppError, Result};
use crate::types::{MatchPhase, SimplePost};

/// Sliding-window call limiter. Timestamps of recent calls are kept and
/// pruned on every check; the caller supplies the clock so tests can drive it.
pub struct RateLimiter {
    window_ms: i64,
    max_calls: usize,
    calls: Mutex<Vec<i64>>,
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_calls: usize) -> Self {
        Self { window_ms, max_calls, calls: Mutex::new(Vec::new()) }
    }

    /// Records the call if within budget. Returns false when the window is full.
    pub fn try_acquire(&self, now_ms: i64) -> bool {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.retain(|t| now_ms - *t < self.window_ms);
        if calls.len() >= self.max_calls {
            return false;
        }
        calls.push(now_ms);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(SUMMARY_RATE_WINDOW_MS, SUMMARY_RATE_MAX_CALLS)
    }
}

pub struct Summarizer {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    limiter: RateLimiter,
}

impl Summarizer {
    pub fn new(cfg: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: cfg.openai_api_key.clone(),
            model: cfg.openai_model.clone(),
            limiter: RateLimiter::default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Summarize a window's posts into a short narrative. Returns
    /// `RateLimited` when the sliding window is exhausted and `Config` when no
    /// API key is set.
    pub async fn summarize(
        &self,
        posts: &[SimplePost],
        phase: MatchPhase,
        lookback_minutes: i64,
        now_ms: i64,
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AppError::Config("OPENAI_API_KEY not set".to_string()))?;

        if !self.limiter.try_acquire(now_ms) {
            return Err(AppError::RateLimited("summary call budget exhausted".to_string()));
        }

        let input = assemble_input(posts);
        info!(
            posts = posts.len(),
            chars = input.len(),
            phase = %phase,
            "[SUMMARY] requesting narrative summary"
        );

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You summarize Arsenal fan sentiment from social media posts. \
                                Be concise and concrete: name the moments and players fans are \
                                reacting to, and the overall mood. At most 3 short paragraphs."
                },
                {
                    "role": "user",
                    "content": format!(
                        "Match phase: {phase}. Posts from the last {lookback_minutes} minutes:\n\n{input}"
                    )
                }
            ],
            "temperature": 0.4
        });

        let resp = self
            .http
            .post(OPENAI_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Summarizer(format!("upstream returned {status}: {text}")));
        }

        let payload: serde_json::Value = resp.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Summarizer("empty completion".to_string()))
    }
}

/// Build the text block sent to the model: newest posts first, capped in both
/// count and characters.
fn assemble_input(posts: &[SimplePost]) -> String {
    let mut sorted: Vec<&SimplePost> = posts.iter().collect();
    sorted.sort_by_key(|p| std::cmp::Reverse(parse_timestamp_ms(&p.created_at).unwrap_or(0)));

    let joined = sorted
        .into_iter()
        .take(MAX_SUMMARY_POSTS)
        .map(|p| format!("[{}] @{}: {}", p.created_at, p.author.handle, p.text))
        .collect::<Vec<_>>()
        .join("\n");

    if joined.len() > MAX_SUMMARY_CHARS {
        let mut cut = MAX_SUMMARY_CHARS;
        while !joined.is_char_boundary(cut) {
            cut -= 1;
        }
        joined[..cut].to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostAuthor;

    fn post(text: &str, created_at: &str) -> SimplePost {
        SimplePost {
            uri: "at://example".to_string(),
            author: PostAuthor {
                did: None,
                handle: "fan.bsky.social".to_string(),
                display_name: None,
            },
            text: text.to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn limiter_allows_up_to_max_then_blocks() {
        let limiter = RateLimiter::new(60_000, 3);
        assert!(limiter.try_acquire(0));
        assert!(limiter.try_acquire(1_000));
        assert!(limiter.try_acquire(2_000));
        assert!(!limiter.try_acquire(3_000));
    }

    #[test]
    fn limiter_frees_slots_as_calls_age_out() {
        let limiter = RateLimiter::new(60_000, 2);
        assert!(limiter.try_acquire(0));
        assert!(limiter.try_acquire(10_000));
        assert!(!limiter.try_acquire(20_000));
        // First call leaves the window at t=60_000.
        assert!(limiter.try_acquire(60_000));
        assert!(!limiter.try_acquire(60_001));
    }

    #[test]
    fn input_lines_are_newest_first() {
        let posts = vec![
            post("older", "2025-10-19T12:00:00Z"),
            post("newer", "2025-10-19T12:05:00Z"),
        ];
        let input = assemble_input(&posts);
        let lines: Vec<&str> = input.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("newer"));
        assert!(lines[1].contains("older"));
        assert!(lines[0].starts_with("[2025-10-19T12:05:00Z] @fan.bsky.social:"));
    }

    #[test]
    fn input_is_truncated_to_char_budget() {
        let long = "x".repeat(MAX_SUMMARY_CHARS);
        let posts = vec![
            post(&long, "2025-10-19T12:00:00Z"),
            post(&long, "2025-10-19T12:01:00Z"),
        ];
        let input = assemble_input(&posts);
        assert!(input.len() <= MAX_SUMMARY_CHARS);
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let cfg = Config {
            appview_base: String::new(),
            log_level: "info".to_string(),
            db_path: String::new(),
            api_port: 0,
            min_followers: 500,
            min_account_months: 6.0,
            max_accounts: 40,
            allowlist: vec![],
            keywords: vec![],
            recency_minutes: 10,
            tick_interval_sec: 10,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            challenge_ttl_ms: 600_000,
        };
        let summarizer = Summarizer::new(&cfg);
        assert!(!summarizer.is_configured());
        let err = summarizer.summarize(&[], MatchPhase::Live, 10, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
