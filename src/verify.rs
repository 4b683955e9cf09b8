//! Identity verification for override requests: a short-lived challenge code
//! the account holder posts publicly, then proven by scanning their recent
//! author feed.

use dashmap::DashMap;
use rand::Rng;
use tracing::{info, warn};

use crate::clock::{now_ms, parse_timestamp_ms};
use crate::fetcher::BskyClient;

/// Feed items scanned when looking for the challenge code.
const VERIFY_FEED_LIMIT: usize = 30;

#[derive(Debug, Clone)]
pub struct Challenge {
    pub code: String,
    pub handle: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

/// In-memory challenge registry, keyed by normalized handle. One live
/// challenge per handle; a new request replaces the old one.
pub struct ChallengeStore {
    ttl_ms: i64,
    entries: DashMap<String, Challenge>,
}

impl ChallengeStore {
    pub fn new(ttl_ms: i64) -> Self {
        Self { ttl_ms, entries: DashMap::new() }
    }

    pub fn create_challenge(&self, handle: &str, now_ms: i64) -> Challenge {
        let key = normalize_handle(handle);
        let challenge = Challenge {
            code: generate_code(),
            handle: key.clone(),
            created_at_ms: now_ms,
            expires_at_ms: now_ms + self.ttl_ms,
        };
        self.entries.insert(key, challenge.clone());
        challenge
    }

    /// Live challenge for a handle; expired entries are removed on access.
    pub fn get_challenge(&self, handle: &str, now_ms: i64) -> Option<Challenge> {
        let key = normalize_handle(handle);
        let expired = match self.entries.get(&key) {
            Some(entry) if now_ms < entry.expires_at_ms => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&key);
        }
        None
    }

    pub fn clear_challenge(&self, handle: &str) {
        self.entries.remove(&normalize_handle(handle));
    }
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

/// Challenge codes look like `AMP-7K2Q9X`.
fn generate_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("AMP-{suffix}")
}

/// Scan the handle's recent public posts for one containing the challenge
/// code, posted within `window_minutes` of now. Fetch failures verify false.
pub async fn verify_post_contains_code(
    client: &BskyClient,
    handle: &str,
    code: &str,
    window_minutes: i64,
) -> bool {
    let actor = normalize_handle(handle);
    let feed = match client.author_feed(&actor, VERIFY_FEED_LIMIT).await {
        Ok(feed) => feed,
        Err(e) => {
            warn!("[VERIFY] feed fetch failed for {actor}: {e}");
            return false;
        }
    };

    let earliest_ms = now_ms() - window_minutes * 60_000;
    let items = feed.get("feed").and_then(|f| f.as_array()).cloned().unwrap_or_default();
    for item in &items {
        let Some(post) = item.get("post") else { continue };
        let text = post
            .get("record")
            .and_then(|r| r.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("");
        if !text.contains(code) {
            continue;
        }
        let created_at = post
            .get("record")
            .and_then(|r| r.get("createdAt"))
            .and_then(|c| c.as_str())
            .or_else(|| post.get("indexedAt").and_then(|i| i.as_str()));
        let fresh = created_at
            .and_then(parse_timestamp_ms)
            .map(|ts| ts >= earliest_ms)
            .unwrap_or(false);
        if fresh {
            info!("[VERIFY] challenge code confirmed for {actor}");
            return true;
        }
    }
    false
}
