use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platform & match phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bsky,
    Twitter,
    Threads,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::Bsky => "bsky",
            Platform::Twitter => "twitter",
            Platform::Threads => "threads",
        };
        write!(f, "{s}")
    }
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bsky" => Some(Platform::Bsky),
            "twitter" => Some(Platform::Twitter),
            "threads" => Some(Platform::Threads),
            _ => None,
        }
    }
}

/// Derived from wall-clock time relative to kickoff; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Pre,
    Live,
    Post,
    Ended,
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchPhase::Pre => "pre",
            MatchPhase::Live => "live",
            MatchPhase::Post => "post",
            MatchPhase::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// Per-request match schedule. Immutable once a tick is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSchedule {
    /// Kickoff as an RFC 3339 timestamp string.
    pub kickoff: String,
    /// Overall live window in real minutes; must be > 0.
    pub live_duration_minutes: i64,
    #[serde(default = "default_halftime")]
    pub halftime_minutes: i64,
    /// Explicit final whistle, if known.
    pub final_whistle: Option<String>,
}

fn default_halftime() -> i64 {
    crate::config::HALFTIME_MIN
}

/// One of six fixed 15-match-minute aggregation buckets used during the live phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBin {
    pub index: usize,
    pub start_minute: i64,
    pub end_minute: i64,
    /// Wall-clock epoch ms at which this bin started.
    pub bin_start_ms: i64,
}

// ---------------------------------------------------------------------------
// Accounts & eligibility
// ---------------------------------------------------------------------------

/// Read-only profile snapshot sourced from the AppView per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub did: Option<String>,
    pub handle: String,
    pub display_name: Option<String>,
    pub user_id: Option<String>,
    pub followers_count: Option<u64>,
    pub posts_count: Option<u64>,
    /// RFC 3339 string; None when the AppView does not expose it.
    pub created_at: Option<String>,
}

impl AccountProfile {
    /// Minimal profile synthesized from an allowlist handle when no AppView data exists.
    pub fn from_handle(handle: &str) -> Self {
        Self {
            did: None,
            handle: handle.to_string(),
            display_name: Some(handle.to_string()),
            user_id: None,
            followers_count: None,
            posts_count: None,
            created_at: None,
        }
    }

    /// Identity keys this profile answers to, in `identifier_type|identifier` form.
    pub fn identity_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(did) = &self.did {
            keys.push(format!("did|{did}"));
        }
        if !self.handle.is_empty() {
            keys.push(format!("handle|{}", self.handle));
        }
        if let Some(uid) = &self.user_id {
            keys.push(format!("user_id|{uid}"));
        }
        keys
    }
}

/// Diagnostic verdict; reasons follow evaluation order (followers first, then age).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedAccount {
    pub profile: AccountProfile,
    pub eligibility: Eligibility,
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    Did,
    Handle,
    UserId,
}

impl IdentifierType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "did" => Some(IdentifierType::Did),
            "handle" => Some(IdentifierType::Handle),
            "user_id" => Some(IdentifierType::UserId),
            _ => None,
        }
    }
}

impl std::fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IdentifierType::Did => "did",
            IdentifierType::Handle => "handle",
            IdentifierType::UserId => "user_id",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideAction {
    Include,
    Exclude,
}

impl OverrideAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "include" => Some(OverrideAction::Include),
            "exclude" => Some(OverrideAction::Exclude),
            _ => None,
        }
    }
}

impl std::fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideAction::Include => write!(f, "include"),
            OverrideAction::Exclude => write!(f, "exclude"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideScope {
    Global,
    Match,
}

impl OverrideScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(OverrideScope::Global),
            "match" => Some(OverrideScope::Match),
            _ => None,
        }
    }
}

impl std::fmt::Display for OverrideScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideScope::Global => write!(f, "global"),
            OverrideScope::Match => write!(f, "match"),
        }
    }
}

/// Admin-authored rule forcibly including or excluding an account.
/// Owned by the admin store; the core only consumes already-fetched rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOverride {
    pub id: String,
    pub platform: Platform,
    pub identifier_type: IdentifierType,
    pub identifier: String,
    pub handle: Option<String>,
    pub action: OverrideAction,
    pub scope: OverrideScope,
    /// Required iff scope == Match.
    pub match_id: Option<String>,
    pub bypass_eligibility: bool,
    pub notes: Option<String>,
    pub expires_at: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AccountOverride {
    /// Identity key used for precedence dedup: `identifier_type|identifier`.
    pub fn identity_key(&self) -> String {
        format!("{}|{}", self.identifier_type, self.identifier)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EffectiveOverrides {
    pub include: Vec<AccountOverride>,
    pub exclude: Vec<AccountOverride>,
}

// ---------------------------------------------------------------------------
// Posts & tick summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub did: Option<String>,
    pub handle: String,
    pub display_name: Option<String>,
}

/// Ephemeral post fetched per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplePost {
    pub uri: String,
    pub author: PostAuthor,
    pub text: String,
    /// RFC 3339 string as supplied by the source.
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub total: usize,
    pub pos: usize,
    pub neu: usize,
    pub neg: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    /// Ratios in 0..1; all zero when no posts were observed.
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
    pub counts: SentimentCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub keyword: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSample {
    pub author_handle: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    pub did: Option<String>,
    pub handle: String,
    pub display_name: Option<String>,
}

/// One aggregation cycle's output. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub match_id: String,
    pub platform: Platform,
    pub window: MatchPhase,
    pub generated_at: String,
    pub tick: u64,
    pub sentiment: SentimentBreakdown,
    /// Total posts observed in this window.
    pub volume: usize,
    pub accounts_used: Vec<AccountRef>,
    pub topics: Vec<TopicCount>,
    pub samples: Vec<QuoteSample>,
}
