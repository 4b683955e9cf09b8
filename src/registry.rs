//! Periodic snapshotting of allowlist accounts into the registry table.
//! The registry is observational: selection always works from fresh profile
//! data, while this table records follower drift and marks accounts that have
//! fallen below the eligibility floor as stale.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{error, info};

use crate::clock::{format_timestamp_ms, now_ms, parse_timestamp_ms};
use crate::config::{Config, REGISTRY_REFRESH_INTERVAL_SECS};
use crate::db::models::RegistryRow;
use crate::eligibility::months_between_ms;
use crate::error::Result;
use crate::fetcher::BskyClient;
use crate::types::{AccountProfile, Platform};

/// Upsert profile snapshots. An account is stale when its followers have
/// dropped below the floor or its known age is below the minimum; unknown age
/// alone never marks it stale.
pub async fn upsert_accounts_registry(
    pool: &SqlitePool,
    profiles: &[AccountProfile],
    min_followers: u64,
    min_account_months: f64,
    now_ms: i64,
) -> Result<usize> {
    let checked_at = format_timestamp_ms(now_ms);
    let mut written = 0usize;

    for profile in profiles {
        let followers = profile.followers_count.unwrap_or(0);
        let too_young = profile
            .created_at
            .as_deref()
            .and_then(parse_timestamp_ms)
            .map(|created| months_between_ms(created, now_ms) < min_account_months)
            .unwrap_or(false);
        let stale = i64::from(followers < min_followers || too_young);

        sqlx::query(
            r#"
            INSERT INTO accounts_registry (
                platform, did, user_id, handle, followers_count, posts_count,
                account_created_at, last_checked_at, stale, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
            ON CONFLICT (platform, handle) DO UPDATE SET
                did = excluded.did,
                user_id = excluded.user_id,
                followers_count = excluded.followers_count,
                posts_count = excluded.posts_count,
                account_created_at = excluded.account_created_at,
                last_checked_at = excluded.last_checked_at,
                stale = excluded.stale,
                last_error = NULL
            "#,
        )
        .bind(Platform::Bsky.to_string())
        .bind(&profile.did)
        .bind(&profile.user_id)
        .bind(&profile.handle)
        .bind(profile.followers_count.map(|n| n as i64))
        .bind(profile.posts_count.map(|n| n as i64))
        .bind(&profile.created_at)
        .bind(&checked_at)
        .bind(stale)
        .execute(pool)
        .await?;
        written += 1;
    }

    Ok(written)
}

/// All registry snapshots for a platform, most-followed first.
pub async fn fetch_registry(pool: &SqlitePool, platform: Platform) -> Result<Vec<RegistryRow>> {
    let rows: Vec<RegistryRow> = sqlx::query_as(
        r#"
        SELECT platform, did, user_id, handle, followers_count, posts_count,
               account_created_at, last_checked_at, stale, last_error
        FROM accounts_registry
        WHERE platform = ?
        ORDER BY followers_count DESC
        "#,
    )
    .bind(platform.to_string())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// API projection of a registry row.
pub fn registry_entry(row: &RegistryRow) -> serde_json::Value {
    serde_json::json!({
        "platform": row.platform,
        "did": row.did,
        "userId": row.user_id,
        "handle": row.handle,
        "followersCount": row.followers_count,
        "postsCount": row.posts_count,
        "accountCreatedAt": row.account_created_at,
        "lastCheckedAt": row.last_checked_at,
        "stale": row.stale != 0,
        "lastError": row.last_error,
    })
}

/// Record a resolution failure against a handle without clobbering its last
/// good snapshot.
pub async fn mark_registry_error(pool: &SqlitePool, handle: &str, err: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE accounts_registry
        SET last_error = ?, last_checked_at = ?
        WHERE platform = ? AND handle = ?
        "#,
    )
    .bind(err)
    .bind(format_timestamp_ms(now_ms()))
    .bind(Platform::Bsky.to_string())
    .bind(handle)
    .execute(pool)
    .await?;
    Ok(())
}

/// Background task that refreshes the registry on an interval.
pub struct RegistryRefresher {
    pool: SqlitePool,
    client: Arc<BskyClient>,
    allowlist: Vec<String>,
    min_followers: u64,
    min_account_months: f64,
    interval_secs: u64,
}

impl RegistryRefresher {
    pub fn new(pool: SqlitePool, client: Arc<BskyClient>, cfg: &Config) -> Self {
        Self {
            pool,
            client,
            allowlist: cfg.allowlist.clone(),
            min_followers: cfg.min_followers,
            min_account_months: cfg.min_account_months,
            interval_secs: REGISTRY_REFRESH_INTERVAL_SECS,
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.refresh_once().await;
        }
    }

    async fn refresh_once(&self) {
        let profiles = self.client.resolve_profiles(&self.allowlist).await;
        if profiles.is_empty() {
            error!("[REGISTRY] no allowlist profiles resolved, skipping refresh");
            return;
        }

        for handle in &self.allowlist {
            if !profiles.iter().any(|p| &p.handle == handle) {
                if let Err(e) =
                    mark_registry_error(&self.pool, handle, "profile resolution failed").await
                {
                    error!("[REGISTRY] failed to record error for {handle}: {e}");
                }
            }
        }

        match upsert_accounts_registry(
            &self.pool,
            &profiles,
            self.min_followers,
            self.min_account_months,
            now_ms(),
        )
        .await
        {
            Ok(written) => {
                info!("[REGISTRY] refreshed {written} account snapshots");
            }
            Err(e) => {
                error!("[REGISTRY] refresh failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_entry_projects_camel_case_and_boolean_stale() {
        let row = RegistryRow {
            platform: "bsky".to_string(),
            did: Some("did:plc:abc".to_string()),
            user_id: None,
            handle: "fan.bsky.social".to_string(),
            followers_count: Some(1200),
            posts_count: Some(340),
            account_created_at: Some("2023-05-01T00:00:00Z".to_string()),
            last_checked_at: "2025-10-19T12:00:00Z".to_string(),
            stale: 1,
            last_error: None,
        };
        let v = registry_entry(&row);
        assert_eq!(v["handle"], "fan.bsky.social");
        assert_eq!(v["followersCount"], 1200);
        assert_eq!(v["accountCreatedAt"], "2023-05-01T00:00:00Z");
        assert_eq!(v["stale"], true);
        assert!(v["lastError"].is_null());
        assert!(v["userId"].is_null());
    }
}
