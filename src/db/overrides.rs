//! Override row storage. The store can be entirely unconfigured (no pool):
//! reads then return empty sets so selection stays resilient without admin
//! infrastructure, while admin writes report a configuration error.

use rand::Rng;
use sqlx::SqlitePool;
use tracing::warn;

use crate::clock::{format_timestamp_ms, now_ms};
use crate::error::{AppError, Result};
use crate::types::{
    AccountOverride, IdentifierType, OverrideAction, OverrideScope, Platform,
};

use super::models::OverrideRow;

/// Parse a raw row into the strict domain type. Malformed rows (unknown
/// platform, identifier type, action, or scope) are quarantined: logged and
/// dropped, never propagated into the resolver.
pub fn parse_override_row(row: &OverrideRow) -> Option<AccountOverride> {
    let platform = Platform::parse(&row.platform);
    let identifier_type = IdentifierType::parse(&row.identifier_type);
    let action = OverrideAction::parse(&row.action);
    let scope = OverrideScope::parse(&row.scope);

    let (Some(platform), Some(identifier_type), Some(action), Some(scope)) =
        (platform, identifier_type, action, scope)
    else {
        warn!(
            id = %row.id,
            platform = %row.platform,
            identifier_type = %row.identifier_type,
            action = %row.action,
            scope = %row.scope,
            "[OVERRIDES] quarantined malformed override row"
        );
        return None;
    };

    Some(AccountOverride {
        id: row.id.clone(),
        platform,
        identifier_type,
        identifier: row.identifier.clone(),
        handle: row.handle.clone(),
        action,
        scope,
        match_id: row.match_id.clone(),
        bypass_eligibility: row.bypass_eligibility != 0,
        notes: row.notes.clone(),
        expires_at: row.expires_at.clone(),
        created_by: row.created_by.clone(),
        created_at: row.created_at.clone(),
        updated_at: row.updated_at.clone(),
    })
}

/// Upsert payload; `id` is generated when absent, `bypass_eligibility`
/// defaults to true, and `match_id` is only stored for match-scoped rows.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OverridePayload {
    pub id: Option<String>,
    pub platform: Platform,
    pub identifier_type: IdentifierType,
    pub identifier: String,
    pub handle: Option<String>,
    pub action: OverrideAction,
    pub scope: OverrideScope,
    pub match_id: Option<String>,
    pub bypass_eligibility: Option<bool>,
    pub notes: Option<String>,
    pub expires_at: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Clone)]
pub struct OverrideStore {
    pool: Option<SqlitePool>,
}

impl OverrideStore {
    pub fn new(pool: Option<SqlitePool>) -> Self {
        Self { pool }
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    /// All current rows for a platform, expired included — expiry filtering is
    /// the resolver's job. Unconfigured store or query error yields an empty
    /// set rather than failing the selection path.
    pub async fn fetch_for_platform(&self, platform: Platform) -> Vec<AccountOverride> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };

        let rows: std::result::Result<Vec<OverrideRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT id, platform, identifier_type, identifier, handle, action, scope,
                   match_id, bypass_eligibility, notes, expires_at, created_by,
                   created_at, updated_at
            FROM account_overrides
            WHERE platform = ?
            "#,
        )
        .bind(platform.to_string())
        .fetch_all(pool)
        .await;

        match rows {
            Ok(rows) => rows.iter().filter_map(parse_override_row).collect(),
            Err(e) => {
                warn!("[OVERRIDES] fetch failed, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    pub async fn upsert(&self, payload: OverridePayload) -> Result<AccountOverride> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| AppError::Config("override store not configured".to_string()))?;

        let id = payload.id.unwrap_or_else(generate_id);
        let now = format_timestamp_ms(now_ms());
        let match_id = if payload.scope == OverrideScope::Match {
            payload.match_id.clone()
        } else {
            None
        };
        let bypass = i64::from(payload.bypass_eligibility.unwrap_or(true));

        sqlx::query(
            r#"
            INSERT INTO account_overrides (
                id, platform, identifier_type, identifier, handle, action, scope,
                match_id, bypass_eligibility, notes, expires_at, created_by,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (platform, identifier_type, identifier, scope, COALESCE(match_id, ''))
            DO UPDATE SET
                handle = excluded.handle,
                action = excluded.action,
                bypass_eligibility = excluded.bypass_eligibility,
                notes = excluded.notes,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(payload.platform.to_string())
        .bind(payload.identifier_type.to_string())
        .bind(&payload.identifier)
        .bind(&payload.handle)
        .bind(payload.action.to_string())
        .bind(payload.scope.to_string())
        .bind(&match_id)
        .bind(bypass)
        .bind(&payload.notes)
        .bind(&payload.expires_at)
        .bind(&payload.created_by)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        // Re-read through the natural key so the caller sees the stored row
        // (the pre-existing id survives an upsert collision).
        let row: OverrideRow = sqlx::query_as(
            r#"
            SELECT id, platform, identifier_type, identifier, handle, action, scope,
                   match_id, bypass_eligibility, notes, expires_at, created_by,
                   created_at, updated_at
            FROM account_overrides
            WHERE platform = ? AND identifier_type = ? AND identifier = ?
              AND scope = ? AND COALESCE(match_id, '') = COALESCE(?, '')
            "#,
        )
        .bind(payload.platform.to_string())
        .bind(payload.identifier_type.to_string())
        .bind(&payload.identifier)
        .bind(payload.scope.to_string())
        .bind(&match_id)
        .fetch_one(pool)
        .await?;

        parse_override_row(&row)
            .ok_or_else(|| AppError::Config("stored override row failed validation".to_string()))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| AppError::Config("override store not configured".to_string()))?;

        let result = sqlx::query("DELETE FROM account_overrides WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("override {id}")));
        }
        Ok(())
    }
}

fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row() -> OverrideRow {
        OverrideRow {
            id: "ov1".to_string(),
            platform: "bsky".to_string(),
            identifier_type: "handle".to_string(),
            identifier: "fan.bsky.social".to_string(),
            handle: None,
            action: "include".to_string(),
            scope: "match".to_string(),
            match_id: Some("m1".to_string()),
            bypass_eligibility: 1,
            notes: None,
            expires_at: None,
            created_by: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn well_formed_row_parses() {
        let parsed = parse_override_row(&raw_row()).unwrap();
        assert_eq!(parsed.platform, Platform::Bsky);
        assert_eq!(parsed.identifier_type, IdentifierType::Handle);
        assert_eq!(parsed.action, OverrideAction::Include);
        assert_eq!(parsed.scope, OverrideScope::Match);
        assert!(parsed.bypass_eligibility);
    }

    #[test]
    fn malformed_rows_are_quarantined() {
        let mut row = raw_row();
        row.action = "banish".to_string();
        assert!(parse_override_row(&row).is_none());

        let mut row = raw_row();
        row.identifier_type = "email".to_string();
        assert!(parse_override_row(&row).is_none());

        let mut row = raw_row();
        row.scope = "universe".to_string();
        assert!(parse_override_row(&row).is_none());

        let mut row = raw_row();
        row.platform = "myspace".to_string();
        assert!(parse_override_row(&row).is_none());
    }

    #[tokio::test]
    async fn unconfigured_store_reads_empty_and_rejects_writes() {
        let store = OverrideStore::new(None);
        assert!(store.fetch_for_platform(Platform::Bsky).await.is_empty());
        assert!(store.delete("ov1").await.is_err());
    }

    #[test]
    fn generated_ids_are_hex_and_unique_enough() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
