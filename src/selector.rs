//! Account selection: eligibility + overrides + ranking/cap policy.
//!
//! Admin include rows are curated data — they are never truncated by the cap
//! and may bypass the eligibility policy entirely. When nothing at all is
//! eligible a small fallback slate is surfaced so the aggregator always has
//! some data to work with (degraded data beats no data).

use std::cmp::Reverse;
use std::collections::HashSet;

use tracing::debug;

use crate::config::Config;
use crate::eligibility::compute_eligibility;
use crate::types::{
    AccountOverride, AccountProfile, EffectiveOverrides, Eligibility, IdentifierType,
    SelectedAccount,
};

#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    pub min_followers: u64,
    pub min_account_months: f64,
    pub max_accounts: usize,
}

impl SelectionPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            min_followers: cfg.min_followers,
            min_account_months: cfg.min_account_months,
            max_accounts: cfg.max_accounts,
        }
    }
}

/// Resolve an include override row to a minimal profile when no full AppView
/// record is available for it.
fn profile_from_override(row: &AccountOverride) -> AccountProfile {
    let fallback_handle = row.handle.clone().unwrap_or_else(|| row.identifier.clone());
    match row.identifier_type {
        IdentifierType::Did => AccountProfile {
            did: Some(row.identifier.clone()),
            handle: fallback_handle.clone(),
            display_name: Some(fallback_handle),
            user_id: None,
            followers_count: None,
            posts_count: None,
            created_at: None,
        },
        IdentifierType::Handle => AccountProfile::from_handle(&row.identifier),
        IdentifierType::UserId => AccountProfile {
            did: None,
            handle: fallback_handle.clone(),
            display_name: Some(fallback_handle),
            user_id: Some(row.identifier.clone()),
            followers_count: None,
            posts_count: None,
            created_at: None,
        },
    }
}

fn is_excluded(profile: &AccountProfile, exclude_keys: &HashSet<String>) -> bool {
    profile.identity_keys().iter().any(|k| exclude_keys.contains(k))
}

fn followers_of(acct: &SelectedAccount) -> u64 {
    acct.profile.followers_count.unwrap_or(0)
}

/// Produce the final ordered, capped account list for one tick.
///
/// `candidates` are pre-resolved profiles (allowlist plus whatever the profile
/// resolver returned); override rows come already collapsed by precedence.
pub fn select_eligible_accounts(
    candidates: &[AccountProfile],
    overrides: &EffectiveOverrides,
    policy: &SelectionPolicy,
    now_ms: i64,
) -> Vec<SelectedAccount> {
    let exclude_keys: HashSet<String> =
        overrides.exclude.iter().map(|r| r.identity_key()).collect();

    // Include list: admin-curated, optional eligibility bypass.
    let mut include_list: Vec<SelectedAccount> = Vec::new();
    let mut included_keys: HashSet<String> = HashSet::new();
    for row in &overrides.include {
        let profile = profile_from_override(row);
        if is_excluded(&profile, &exclude_keys) {
            continue;
        }
        let eligibility = if row.bypass_eligibility {
            Eligibility {
                eligible: true,
                reasons: vec!["admin:include override (bypass=true)".to_string()],
            }
        } else {
            let e = compute_eligibility(
                &profile,
                policy.min_followers,
                policy.min_account_months,
                now_ms,
            );
            if !e.eligible {
                continue;
            }
            e
        };
        included_keys.extend(profile.identity_keys());
        include_list.push(SelectedAccount { profile, eligibility });
    }

    // Base list: non-excluded candidates that pass eligibility on their own.
    let mut base_list: Vec<SelectedAccount> = Vec::new();
    for profile in candidates {
        if is_excluded(profile, &exclude_keys) {
            continue;
        }
        if profile.identity_keys().iter().any(|k| included_keys.contains(k)) {
            continue;
        }
        let eligibility =
            compute_eligibility(profile, policy.min_followers, policy.min_account_months, now_ms);
        if !eligibility.eligible {
            continue;
        }
        base_list.push(SelectedAccount { profile: profile.clone(), eligibility });
    }
    base_list.sort_by_key(|a| Reverse(followers_of(a)));

    // Degenerate case: nothing eligible but candidates exist. Surface a small
    // ranked slate of ineligible accounts rather than starving the aggregator.
    if include_list.is_empty() && base_list.is_empty() && !candidates.is_empty() {
        let mut slate: Vec<SelectedAccount> = candidates
            .iter()
            .filter(|p| !is_excluded(p, &exclude_keys))
            .map(|p| SelectedAccount {
                profile: p.clone(),
                eligibility: compute_eligibility(
                    p,
                    policy.min_followers,
                    policy.min_account_months,
                    now_ms,
                ),
            })
            .collect();
        slate.sort_by_key(|a| Reverse(followers_of(a)));
        let n = 5usize.max(10usize.min(policy.max_accounts)).min(policy.max_accounts);
        slate.truncate(n);
        debug!(slate = slate.len(), "no eligible accounts; surfacing fallback slate");
        return slate;
    }

    let mut merged: Vec<SelectedAccount> = Vec::with_capacity(include_list.len() + base_list.len());
    merged.extend(include_list.iter().cloned());
    merged.extend(base_list.iter().cloned());

    if merged.len() > policy.max_accounts {
        // The include list is never truncated; remaining capacity is filled
        // from the follower-ranked base list.
        let remaining = policy.max_accounts.saturating_sub(include_list.len());
        base_list.truncate(remaining);
        let mut capped = include_list;
        capped.extend(base_list);
        return capped;
    }

    merged.sort_by_key(|a| Reverse(followers_of(a)));
    merged
}
