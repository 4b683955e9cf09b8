use crate::error::{AppError, Result};

pub const APPVIEW_BASE: &str = "https://public.api.bsky.app/xrpc";
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Minutes before kickoff at which the pre-match window opens.
pub const PRE_WINDOW_MIN: i64 = 120;

/// Default overall live window length in real minutes (covers halftime and stoppage).
pub const DEFAULT_LIVE_DURATION_MIN: i64 = 120;

/// Minutes after the live window during which the post-match window runs.
pub const POST_WINDOW_MIN: i64 = 60;

/// Halftime break length in real minutes, collapsed out of the 0–90 scale.
pub const HALFTIME_MIN: i64 = 15;

/// Eligibility thresholds. Bluesky is young, so the age floor is months, not years.
pub const MIN_FOLLOWERS: u64 = 500;
pub const MIN_ACCOUNT_MONTHS: f64 = 6.0;

/// Maximum accounts polled per tick — keeps AppView request volume bounded.
pub const MAX_ACCOUNTS: usize = 40;

/// Lookback window in minutes when no explicit match window is supplied.
pub const DEFAULT_RECENCY_MINUTES: i64 = 10;

/// Seconds between live SSE ticks.
pub const DEFAULT_TICK_INTERVAL_SEC: u64 = 10;

/// Per-author feed fetch size — small to respect AppView rate limits.
pub const PER_AUTHOR_FETCH_LIMIT: usize = 25;

/// Caps on the text block assembled for the LLM summarizer.
pub const MAX_SUMMARY_POSTS: usize = 150;
pub const MAX_SUMMARY_CHARS: usize = 12_000;

/// Outbound request timeout (AppView and summarizer calls).
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Identity-verification challenge TTL.
pub const CHALLENGE_TTL_MS: i64 = 10 * 60_000;

/// Sliding-window limits on summarizer calls.
pub const SUMMARY_RATE_MAX_CALLS: usize = 6;
pub const SUMMARY_RATE_WINDOW_MS: i64 = 60_000;

/// Registry refresher interval (seconds).
pub const REGISTRY_REFRESH_INTERVAL_SECS: u64 = 600;

/// Soft cap on a single SSE connection; clients reconnect after this.
pub const STREAM_MAX_DURATION_SECS: u64 = 15 * 60;

/// Channel capacity for the tick → DB writer path.
pub const CHANNEL_CAPACITY: usize = 256;

/// Default seed allowlist of fan-account handles, validated for eligibility at runtime.
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "arseblog.com",
    "gunnerblog.bsky.social",
    "ltarsenal.bsky.social",
    "afcstuff.bsky.social",
    "goonertalk.bsky.social",
];

/// Keywords biasing topic extraction; tunable per match via env.
pub const DEFAULT_KEYWORDS: &[&str] = &["Arsenal", "AFC", "COYG", "Arteta", "Saka", "Odegaard"];

#[derive(Debug, Clone)]
pub struct Config {
    pub appview_base: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Minimum follower count for eligibility (MIN_FOLLOWERS)
    pub min_followers: u64,
    /// Minimum account age in 30-day months (MIN_ACCOUNT_MONTHS)
    pub min_account_months: f64,
    /// Max accounts polled per tick (MAX_ACCOUNTS)
    pub max_accounts: usize,
    /// Comma-separated allowlist handles (ALLOWLIST)
    pub allowlist: Vec<String>,
    /// Comma-separated topic keywords (KEYWORDS)
    pub keywords: Vec<String>,
    pub recency_minutes: i64,
    pub tick_interval_sec: u64,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub challenge_ttl_ms: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            appview_base: std::env::var("APPVIEW_BASE").unwrap_or_else(|_| APPVIEW_BASE.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "matchpulse.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            min_followers: std::env::var("MIN_FOLLOWERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MIN_FOLLOWERS),
            min_account_months: std::env::var("MIN_ACCOUNT_MONTHS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MIN_ACCOUNT_MONTHS),
            max_accounts: std::env::var("MAX_ACCOUNTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_ACCOUNTS),
            allowlist: list_env("ALLOWLIST", DEFAULT_ALLOWLIST),
            keywords: list_env("KEYWORDS", DEFAULT_KEYWORDS),
            recency_minutes: std::env::var("RECENCY_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_RECENCY_MINUTES),
            tick_interval_sec: std::env::var("TICK_INTERVAL_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|s| *s >= 1)
                .unwrap_or(DEFAULT_TICK_INTERVAL_SEC),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            challenge_ttl_ms: std::env::var("CHALLENGE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(CHALLENGE_TTL_MS),
        })
    }
}

/// Comma-separated list env var with a const default.
fn list_env(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}
