/// Database row types. Raw strings from storage are parsed into the strict
/// domain enums at the boundary (see `overrides::parse_override_row`).

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OverrideRow {
    pub id: String,
    pub platform: String,
    pub identifier_type: String,
    pub identifier: String,
    pub handle: Option<String>,
    pub action: String,
    pub scope: String,
    pub match_id: Option<String>,
    pub bypass_eligibility: i64,
    pub notes: Option<String>,
    pub expires_at: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RegistryRow {
    pub platform: String,
    pub did: Option<String>,
    pub user_id: Option<String>,
    pub handle: String,
    pub followers_count: Option<i64>,
    pub posts_count: Option<i64>,
    pub account_created_at: Option<String>,
    pub last_checked_at: String,
    pub stale: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TickSummaryRow {
    pub id: i64,
    pub match_id: String,
    pub platform: String,
    pub window: String,
    pub tick: i64,
    pub generated_at: String,
    pub volume: i64,
    /// Full TickSummary serialized as JSON.
    pub payload: String,
    pub created_at: i64,
}
