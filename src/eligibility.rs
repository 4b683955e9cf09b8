//! Account eligibility policy: follower floor plus account-age floor.
//!
//! Age uses a flat 30-day-month approximation rather than calendar months;
//! the drift (up to ~3 days/year) is accepted. Unknown age never disqualifies —
//! the public AppView does not always expose `createdAt`, so only the follower
//! check can fail such accounts, and the uncertainty is disclosed in `reasons`.

use crate::clock::parse_timestamp_ms;
use crate::types::{AccountProfile, Eligibility};

const MS_PER_30_DAY_MONTH: f64 = 1000.0 * 60.0 * 60.0 * 24.0 * 30.0;

/// Absolute difference between two timestamps in 30-day months.
pub fn months_between_ms(a_ms: i64, b_ms: i64) -> f64 {
    (a_ms - b_ms).abs() as f64 / MS_PER_30_DAY_MONTH
}

/// Evaluate a profile against the platform thresholds.
/// Reasons are ordered by evaluation: followers first, then age.
pub fn compute_eligibility(
    profile: &AccountProfile,
    min_followers: u64,
    min_account_months: f64,
    now_ms: i64,
) -> Eligibility {
    let mut reasons = Vec::new();
    let mut ok = true;

    let followers = profile.followers_count.unwrap_or(0);
    if followers < min_followers {
        ok = false;
        reasons.push(format!("followers={followers} < min={min_followers}"));
    } else {
        reasons.push(format!("followers={followers} ≥ min={min_followers}"));
    }

    match profile.created_at.as_deref().and_then(parse_timestamp_ms) {
        Some(created_ms) => {
            let months = months_between_ms(created_ms, now_ms);
            if months < min_account_months {
                ok = false;
                reasons.push(format!("age={months:.1}mo < min={min_account_months}mo"));
            } else {
                reasons.push(format!("age={months:.1}mo ≥ min={min_account_months}mo"));
            }
        }
        None => {
            reasons.push("age=unknown; allowed based on followers/activity".to_string());
        }
    }

    Eligibility { eligible: ok, reasons }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::format_timestamp_ms;

    fn profile(followers: Option<u64>, created_at: Option<String>) -> AccountProfile {
        AccountProfile {
            did: Some("did:plc:test".to_string()),
            handle: "fan.bsky.social".to_string(),
            display_name: None,
            user_id: None,
            followers_count: followers,
            posts_count: Some(100),
            created_at,
        }
    }

    const NOW: i64 = 1_760_000_000_000;

    fn months_ago(months: f64) -> String {
        format_timestamp_ms(NOW - (months * MS_PER_30_DAY_MONTH) as i64)
    }

    #[test]
    fn low_followers_fail_regardless_of_age() {
        let e = compute_eligibility(&profile(Some(100), Some(months_ago(48.0))), 500, 6.0, NOW);
        assert!(!e.eligible);
        assert_eq!(e.reasons[0], "followers=100 < min=500");
        assert!(e.reasons[1].starts_with("age=48.0mo ≥"));
    }

    #[test]
    fn young_account_fails_even_with_followers() {
        let e = compute_eligibility(&profile(Some(900), Some(months_ago(2.0))), 500, 6.0, NOW);
        assert!(!e.eligible);
        assert_eq!(e.reasons[0], "followers=900 ≥ min=500");
        assert_eq!(e.reasons[1], "age=2.0mo < min=6mo");
    }

    #[test]
    fn missing_created_at_allows_on_followers() {
        let e = compute_eligibility(&profile(Some(900), None), 500, 6.0, NOW);
        assert!(e.eligible);
        assert_eq!(e.reasons[1], "age=unknown; allowed based on followers/activity");
    }

    #[test]
    fn unparseable_created_at_is_treated_as_unknown() {
        let e = compute_eligibility(&profile(Some(900), Some("???".to_string())), 500, 6.0, NOW);
        assert!(e.eligible);
        assert_eq!(e.reasons[1], "age=unknown; allowed based on followers/activity");
    }

    #[test]
    fn missing_follower_count_defaults_to_zero() {
        let e = compute_eligibility(&profile(None, None), 500, 6.0, NOW);
        assert!(!e.eligible);
        assert_eq!(e.reasons[0], "followers=0 < min=500");
    }

    #[test]
    fn eligible_account_lists_both_passing_reasons() {
        let e = compute_eligibility(&profile(Some(2000), Some(months_ago(12.0))), 500, 6.0, NOW);
        assert!(e.eligible);
        assert_eq!(e.reasons.len(), 2);
        assert_eq!(e.reasons[0], "followers=2000 ≥ min=500");
        assert_eq!(e.reasons[1], "age=12.0mo ≥ min=6mo");
    }
}
