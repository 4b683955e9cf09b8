//! Tick aggregation: sentiment ratios, keyword topics, and quote samples over
//! one window's worth of posts, plus the orchestration that produces a
//! TickSummary from live collaborators.

use std::sync::Arc;

use tracing::info;

use crate::clock::{format_timestamp_ms, now_ms, parse_timestamp_ms};
use crate::config::Config;
use crate::db::OverrideStore;
use crate::fetcher::BskyClient;
use crate::overrides::resolve_overrides;
use crate::selector::{select_eligible_accounts, SelectionPolicy};
use crate::sentiment::SentimentScorer;
use crate::types::{
    AccountRef, MatchPhase, Platform, QuoteSample, SelectedAccount, SentimentBreakdown,
    SentimentCounts, SimplePost, TickSummary, TopicCount,
};

/// Number of quote samples included in each tick.
const SAMPLE_COUNT: usize = 5;

/// Topics are capped at the top N by count.
const TOPIC_LIMIT: usize = 10;

/// Classify each post by its signed score and compute ratios.
/// The divisor is max(1, total): an empty post list yields all-zero counts
/// and ratios instead of dividing by zero.
pub fn summarize_sentiment(
    posts: &[SimplePost],
    scorer: &dyn SentimentScorer,
) -> SentimentBreakdown {
    let mut counts = SentimentCounts { total: posts.len(), ..Default::default() };

    for post in posts {
        let score = scorer.score(&post.text);
        if score > 0.0 {
            counts.pos += 1;
        } else if score < 0.0 {
            counts.neg += 1;
        } else {
            counts.neu += 1;
        }
    }

    let divisor = counts.total.max(1) as f64;
    SentimentBreakdown {
        pos: counts.pos as f64 / divisor,
        neu: counts.neu as f64 / divisor,
        neg: counts.neg as f64 / divisor,
        counts,
    }
}

/// Case-insensitive substring matching of keywords against post texts.
/// A keyword counts at most once per post; results are ranked by count
/// descending and truncated to the top 10.
pub fn extract_topics(posts: &[SimplePost], keywords: &[String]) -> Vec<TopicCount> {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut counts = vec![0usize; lowered.len()];

    for post in posts {
        let text = post.text.to_lowercase();
        for (i, kw) in lowered.iter().enumerate() {
            if !kw.is_empty() && text.contains(kw.as_str()) {
                counts[i] += 1;
            }
        }
    }

    let mut topics: Vec<TopicCount> = lowered
        .into_iter()
        .zip(counts)
        .filter(|(_, c)| *c > 0)
        .map(|(keyword, count)| TopicCount { keyword, count })
        .collect();
    topics.sort_by(|a, b| b.count.cmp(&a.count));
    topics.truncate(TOPIC_LIMIT);
    topics
}

/// The `n` most recently created posts, newest first, projected to samples.
/// Posts with unparseable timestamps sort as oldest.
pub fn sample_quotes(posts: &[SimplePost], n: usize) -> Vec<QuoteSample> {
    let mut sorted: Vec<&SimplePost> = posts.iter().collect();
    sorted.sort_by_key(|p| std::cmp::Reverse(parse_timestamp_ms(&p.created_at).unwrap_or(0)));
    sorted
        .into_iter()
        .take(n)
        .map(|p| QuoteSample {
            author_handle: p.author.handle.clone(),
            text: p.text.clone(),
            created_at: p.created_at.clone(),
        })
        .collect()
}

/// Produces TickSummaries from live collaborators: profile resolution,
/// override storage, post fetching, and the sentiment scorer.
pub struct TickBuilder {
    cfg: Config,
    client: Arc<BskyClient>,
    overrides: OverrideStore,
    scorer: Arc<dyn SentimentScorer>,
}

impl TickBuilder {
    pub fn new(
        cfg: Config,
        client: Arc<BskyClient>,
        overrides: OverrideStore,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Self {
        Self { cfg, client, overrides, scorer }
    }

    /// Final account slate for a tick: allowlist profiles + override rows,
    /// run through the selection policy.
    pub async fn selected_accounts(&self, match_id: Option<&str>) -> Vec<SelectedAccount> {
        let profiles = self.client.resolve_profiles(&self.cfg.allowlist).await;
        let rows = self.overrides.fetch_for_platform(Platform::Bsky).await;
        let effective = resolve_overrides(&rows, match_id, now_ms());
        let policy = SelectionPolicy::from_config(&self.cfg);
        select_eligible_accounts(&profiles, &effective, &policy, now_ms())
    }

    /// One aggregation cycle. Individual account fetch failures are skipped
    /// inside the client; the tick itself always completes.
    pub async fn build_tick(
        &self,
        match_id: &str,
        window: MatchPhase,
        tick: u64,
        since_minutes: i64,
    ) -> TickSummary {
        let accounts = self.selected_accounts(Some(match_id)).await;
        let posts = self.client.fetch_recent_posts(&accounts, since_minutes).await;

        let sentiment = summarize_sentiment(&posts, self.scorer.as_ref());
        let topics = extract_topics(&posts, &self.cfg.keywords);
        let samples = sample_quotes(&posts, SAMPLE_COUNT);

        info!(
            match_id = %match_id,
            window = %window,
            tick,
            accounts = accounts.len(),
            volume = posts.len(),
            pos = sentiment.pos,
            neg = sentiment.neg,
            "[TICK] aggregated window"
        );

        TickSummary {
            match_id: match_id.to_string(),
            platform: Platform::Bsky,
            window,
            generated_at: format_timestamp_ms(now_ms()),
            tick,
            sentiment,
            volume: posts.len(),
            accounts_used: accounts
                .iter()
                .map(|a| AccountRef {
                    did: a.profile.did.clone(),
                    handle: a.profile.handle.clone(),
                    display_name: a.profile.display_name.clone(),
                })
                .collect(),
            topics,
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::LexiconScorer;
    use crate::types::PostAuthor;

    fn post(text: &str, created_at: &str) -> SimplePost {
        SimplePost {
            uri: format!("at://{}", created_at),
            author: PostAuthor {
                did: Some("did:plc:fan".to_string()),
                handle: "fan.bsky.social".to_string(),
                display_name: None,
            },
            text: text.to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn empty_posts_yield_zero_counts_and_ratios() {
        let s = summarize_sentiment(&[], &LexiconScorer::new());
        assert_eq!(s.counts, SentimentCounts::default());
        assert_eq!(s.pos, 0.0);
        assert_eq!(s.neu, 0.0);
        assert_eq!(s.neg, 0.0);
    }

    #[test]
    fn three_way_split_gives_one_third_ratios() {
        let posts = vec![
            post("Great Arsenal performance!", "2025-10-19T12:00:00Z"),
            post("Terrible Arsenal performance!", "2025-10-19T12:01:00Z"),
            post("Arsenal played okay today", "2025-10-19T12:02:00Z"),
        ];
        let s = summarize_sentiment(&posts, &LexiconScorer::new());
        assert_eq!(s.counts.total, 3);
        assert_eq!(s.counts.pos, 1);
        assert_eq!(s.counts.neg, 1);
        assert_eq!(s.counts.neu, 1);
        assert!((s.pos - 1.0 / 3.0).abs() < 1e-9);
        assert!((s.neg - 1.0 / 3.0).abs() < 1e-9);
        assert!((s.neu - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn topics_count_once_per_post_and_rank_descending() {
        let posts = vec![
            post("Saka Saka Saka what a goal", "2025-10-19T12:00:00Z"),
            post("saka and arteta masterclass", "2025-10-19T12:01:00Z"),
            post("Arteta got the subs right", "2025-10-19T12:02:00Z"),
        ];
        let keywords = vec!["Saka".to_string(), "Arteta".to_string(), "Rice".to_string()];
        let topics = extract_topics(&posts, &keywords);
        assert_eq!(topics.len(), 2);
        // "Saka" appears in two posts (three mentions in one post count once).
        assert_eq!(topics[0], TopicCount { keyword: "saka".to_string(), count: 2 });
        assert_eq!(topics[1], TopicCount { keyword: "arteta".to_string(), count: 2 });
    }

    #[test]
    fn topics_truncate_to_top_ten() {
        let posts = vec![post(
            "a b c d e f g h i j k l",
            "2025-10-19T12:00:00Z",
        )];
        let keywords: Vec<String> =
            "a b c d e f g h i j k l".split(' ').map(|s| s.to_string()).collect();
        let topics = extract_topics(&posts, &keywords);
        assert_eq!(topics.len(), 10);
    }

    #[test]
    fn samples_are_newest_first() {
        let posts = vec![
            post("first", "2025-10-19T12:00:00Z"),
            post("third", "2025-10-19T12:10:00Z"),
            post("second", "2025-10-19T12:05:00Z"),
        ];
        let samples = sample_quotes(&posts, 2);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].text, "third");
        assert_eq!(samples[1].text, "second");
        assert_eq!(samples[0].author_handle, "fan.bsky.social");
    }

    #[test]
    fn unparseable_timestamps_sort_last_in_samples() {
        let posts = vec![
            post("dated", "2025-10-19T12:00:00Z"),
            post("undated", "when it happened"),
        ];
        let samples = sample_quotes(&posts, 5);
        assert_eq!(samples[0].text, "dated");
        assert_eq!(samples[1].text, "undated");
    }
}
