//! Bluesky AppView client: profile resolution and author-feed post fetches.
//!
//! Public AppView reads only, no auth. Every call tolerates partial failure:
//! a handle that fails to resolve or an author feed that errors is skipped
//! with a warning and never aborts the batch.

use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{now_ms, parse_timestamp_ms};
use crate::config::{Config, PER_AUTHOR_FETCH_LIMIT, REQUEST_TIMEOUT_SECS};
use crate::error::Result;
use crate::types::{AccountProfile, PostAuthor, SelectedAccount, SimplePost};

pub struct BskyClient {
    http: reqwest::Client,
    appview_base: String,
}

impl BskyClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, appview_base: cfg.appview_base.clone() })
    }

    /// Resolve allowlist handles to profile snapshots.
    ///
    /// Prefers the batch `getProfiles` endpoint; on batch failure falls back to
    /// per-handle `getProfile` lookups, skipping handles that fail.
    pub async fn resolve_profiles(&self, handles: &[String]) -> Vec<AccountProfile> {
        if handles.is_empty() {
            return Vec::new();
        }

        match self.get_profiles_batch(handles).await {
            Ok(profiles) if !profiles.is_empty() => return profiles,
            Ok(_) => {}
            Err(e) => {
                warn!("[APPVIEW] batch getProfiles failed, falling back to per-handle: {e}");
            }
        }

        let mut profiles = Vec::new();
        for handle in handles {
            match self.get_profile(handle).await {
                Ok(Some(p)) => profiles.push(p),
                Ok(None) => {}
                Err(e) => {
                    debug!("[APPVIEW] getProfile failed for {handle}: {e}");
                }
            }
        }
        profiles
    }

    async fn get_profiles_batch(&self, handles: &[String]) -> Result<Vec<AccountProfile>> {
        let url = format!("{}/app.bsky.actor.getProfiles", self.appview_base);
        let query: Vec<(&str, &str)> =
            handles.iter().map(|h| ("actors", h.as_str())).collect();
        let resp: serde_json::Value =
            self.http.get(&url).query(&query).send().await?.json().await?;

        let profiles = resp
            .get("profiles")
            .and_then(|p| p.as_array())
            .map(|arr| arr.iter().filter_map(parse_profile).collect())
            .unwrap_or_default();
        Ok(profiles)
    }

    async fn get_profile(&self, handle: &str) -> Result<Option<AccountProfile>> {
        let url = format!("{}/app.bsky.actor.getProfile", self.appview_base);
        let resp: serde_json::Value = self
            .http
            .get(&url)
            .query(&[("actor", handle)])
            .send()
            .await?
            .json()
            .await?;
        Ok(parse_profile(&resp))
    }

    /// Fetch recent text posts for the selected accounts, filtered to the last
    /// `since_minutes`. Per-account failures are skipped, never fatal.
    pub async fn fetch_recent_posts(
        &self,
        accounts: &[SelectedAccount],
        since_minutes: i64,
    ) -> Vec<SimplePost> {
        let minutes = if since_minutes > 0 {
            since_minutes
        } else {
            crate::config::DEFAULT_RECENCY_MINUTES
        };
        let since_ms = now_ms() - minutes * 60_000;

        let mut out = Vec::new();
        for acct in accounts {
            let actor = acct
                .profile
                .did
                .clone()
                .unwrap_or_else(|| acct.profile.handle.clone());
            if actor.is_empty() {
                continue;
            }
            match self.author_feed(&actor, PER_AUTHOR_FETCH_LIMIT).await {
                Ok(feed) => {
                    out.extend(feed_to_posts(&feed, &acct.profile, since_ms));
                }
                Err(e) => {
                    warn!("[APPVIEW] author feed failed for {actor}: {e}");
                }
            }
        }
        out
    }

    pub async fn author_feed(&self, actor: &str, limit: usize) -> Result<serde_json::Value> {
        let url = format!("{}/app.bsky.feed.getAuthorFeed", self.appview_base);
        let limit = limit.to_string();
        let resp: serde_json::Value = self
            .http
            .get(&url)
            .query(&[("actor", actor), ("limit", limit.as_str()), ("filter", "posts_no_replies")])
            .send()
            .await?
            .json()
            .await?;
        Ok(resp)
    }
}

fn parse_profile(v: &serde_json::Value) -> Option<AccountProfile> {
    let handle = v.get("handle")?.as_str()?.to_string();
    Some(AccountProfile {
        did: v.get("did").and_then(|d| d.as_str()).map(|s| s.to_string()),
        handle,
        display_name: v
            .get("displayName")
            .and_then(|d| d.as_str())
            .map(|s| s.to_string()),
        user_id: None,
        followers_count: v.get("followersCount").and_then(|n| n.as_u64()),
        posts_count: v.get("postsCount").and_then(|n| n.as_u64()),
        created_at: v.get("createdAt").and_then(|c| c.as_str()).map(|s| s.to_string()),
    })
}

/// Flatten a `getAuthorFeed` response into SimplePosts within the window.
/// Posts with no parseable text or timestamp are skipped; an unparseable
/// `createdAt` is kept (fail open) since the feed is already recency-ordered.
fn feed_to_posts(
    feed_resp: &serde_json::Value,
    fallback: &AccountProfile,
    since_ms: i64,
) -> Vec<SimplePost> {
    let items = feed_resp
        .get("feed")
        .and_then(|f| f.as_array())
        .cloned()
        .unwrap_or_default();

    let mut posts = Vec::new();
    for item in &items {
        let Some(post) = item.get("post") else { continue };
        let record = post.get("record");

        let created_at = record
            .and_then(|r| r.get("createdAt"))
            .and_then(|c| c.as_str())
            .or_else(|| post.get("indexedAt").and_then(|i| i.as_str()));
        let Some(created_at) = created_at else { continue };
        if let Some(ts) = parse_timestamp_ms(created_at) {
            if ts < since_ms {
                continue;
            }
        }

        let text = record
            .and_then(|r| r.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("");
        if text.is_empty() {
            continue;
        }

        let author = post.get("author");
        posts.push(SimplePost {
            uri: post.get("uri").and_then(|u| u.as_str()).unwrap_or("").to_string(),
            author: PostAuthor {
                did: author
                    .and_then(|a| a.get("did"))
                    .and_then(|d| d.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| fallback.did.clone()),
                handle: author
                    .and_then(|a| a.get("handle"))
                    .and_then(|h| h.as_str())
                    .unwrap_or(&fallback.handle)
                    .to_string(),
                display_name: author
                    .and_then(|a| a.get("displayName"))
                    .and_then(|d| d.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| fallback.display_name.clone()),
            },
            text: text.to_string(),
            created_at: created_at.to_string(),
        });
    }
    posts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_profile() -> AccountProfile {
        AccountProfile::from_handle("fan.bsky.social")
    }

    #[test]
    fn feed_items_are_flattened_and_window_filtered() {
        let feed = serde_json::json!({
            "feed": [
                { "post": {
                    "uri": "at://1",
                    "author": { "did": "did:plc:a", "handle": "fan.bsky.social" },
                    "record": { "text": "COYG!", "createdAt": "2025-10-19T12:00:00Z" }
                }},
                { "post": {
                    "uri": "at://2",
                    "author": { "did": "did:plc:a", "handle": "fan.bsky.social" },
                    "record": { "text": "old news", "createdAt": "2025-10-19T10:00:00Z" }
                }}
            ]
        });
        let since = parse_timestamp_ms("2025-10-19T11:50:00Z").unwrap();
        let posts = feed_to_posts(&feed, &fallback_profile(), since);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].uri, "at://1");
        assert_eq!(posts[0].text, "COYG!");
    }

    #[test]
    fn posts_without_text_or_timestamp_are_skipped() {
        let feed = serde_json::json!({
            "feed": [
                { "post": { "uri": "at://1", "record": { "createdAt": "2025-10-19T12:00:00Z" } } },
                { "post": { "uri": "at://2", "record": { "text": "hello" } } },
                { "notAPost": true }
            ]
        });
        let posts = feed_to_posts(&feed, &fallback_profile(), 0);
        assert!(posts.is_empty());
    }

    #[test]
    fn indexed_at_is_a_fallback_timestamp() {
        let feed = serde_json::json!({
            "feed": [
                { "post": {
                    "uri": "at://1",
                    "indexedAt": "2025-10-19T12:00:00Z",
                    "record": { "text": "late whistle" }
                }}
            ]
        });
        let posts = feed_to_posts(&feed, &fallback_profile(), 0);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].created_at, "2025-10-19T12:00:00Z");
        // Author fields fall back to the selected profile.
        assert_eq!(posts[0].author.handle, "fan.bsky.social");
    }

    #[test]
    fn profile_parsing_tolerates_missing_fields() {
        let v = serde_json::json!({ "handle": "fan.bsky.social" });
        let p = parse_profile(&v).unwrap();
        assert_eq!(p.handle, "fan.bsky.social");
        assert!(p.did.is_none());
        assert!(p.followers_count.is_none());

        assert!(parse_profile(&serde_json::json!({ "did": "did:plc:x" })).is_none());
    }
}
