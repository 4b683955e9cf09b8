//! API-budget planning: given a platform's request pricing and the polling
//! cadence, estimate how many accounts can be polled per tick without
//! exceeding a monthly spend. Bluesky's public AppView is unmetered, so its
//! plan carries no cost-derived cap.

use serde::Serialize;

use crate::config::{DEFAULT_LIVE_DURATION_MIN, POST_WINDOW_MIN, PRE_WINDOW_MIN};
use crate::types::Platform;

pub const DEFAULT_MATCHES_PER_MONTH: u32 = 8;

/// Headroom multiplier on estimated request volume.
pub const DEFAULT_SAFETY_BUFFER: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct BudgetParams {
    pub matches_per_month: u32,
    /// Covered window lengths per match, in minutes.
    pub pre_minutes: i64,
    pub live_minutes: i64,
    pub post_minutes: i64,
    pub tick_interval_sec: u64,
    pub safety_buffer: f64,
}

impl BudgetParams {
    pub fn from_env(tick_interval_sec: u64) -> Self {
        Self {
            matches_per_month: env_parse("MATCHES_PER_MONTH", DEFAULT_MATCHES_PER_MONTH),
            pre_minutes: env_parse("BUDGET_PRE_MINUTES", PRE_WINDOW_MIN),
            live_minutes: env_parse("BUDGET_LIVE_MINUTES", DEFAULT_LIVE_DURATION_MIN - 15),
            post_minutes: env_parse("BUDGET_POST_MINUTES", POST_WINDOW_MIN),
            tick_interval_sec,
            safety_buffer: env_parse("BUDGET_SAFETY_BUFFER", DEFAULT_SAFETY_BUFFER),
        }
    }

    /// Requests one account generates across a month of covered windows.
    pub fn requests_per_account_per_month(&self) -> f64 {
        let covered_secs =
            (self.pre_minutes + self.live_minutes + self.post_minutes).max(0) as f64 * 60.0;
        let interval = self.tick_interval_sec.max(1) as f64;
        let ticks_per_match = covered_secs / interval;
        ticks_per_match * self.matches_per_month as f64 * self.safety_buffer
    }
}

/// Largest account count whose monthly request cost stays within budget.
/// `None` when the platform is unmetered (zero or absent pricing), meaning
/// the cap should come from the polling policy instead.
pub fn estimate_max_accounts(
    monthly_budget_usd: f64,
    cost_per_1k_requests_usd: Option<f64>,
    params: &BudgetParams,
) -> Option<usize> {
    let cost_per_1k = cost_per_1k_requests_usd.filter(|c| *c > 0.0)?;
    if monthly_budget_usd <= 0.0 {
        return Some(0);
    }
    let per_account_cost = params.requests_per_account_per_month() / 1000.0 * cost_per_1k;
    if per_account_cost <= 0.0 {
        return None;
    }
    Some((monthly_budget_usd / per_account_cost).floor() as usize)
}

/// Plan surfaced by the accounts API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPlan {
    pub platform: Platform,
    pub configured_max_accounts: usize,
    /// Cost-derived ceiling; absent for unmetered platforms.
    pub budget_max_accounts: Option<usize>,
    pub effective_max_accounts: usize,
    pub requests_per_account_per_month: f64,
}

pub fn plan_for_platform(
    platform: Platform,
    configured_max: usize,
    monthly_budget_usd: f64,
    cost_per_1k_requests_usd: Option<f64>,
    params: &BudgetParams,
) -> AccountPlan {
    let budget_max = estimate_max_accounts(monthly_budget_usd, cost_per_1k_requests_usd, params);
    let effective = match budget_max {
        Some(cap) => configured_max.min(cap),
        None => configured_max,
    };
    AccountPlan {
        platform,
        configured_max_accounts: configured_max,
        budget_max_accounts: budget_max,
        effective_max_accounts: effective,
        requests_per_account_per_month: params.requests_per_account_per_month(),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BudgetParams {
        BudgetParams {
            matches_per_month: 8,
            pre_minutes: 120,
            live_minutes: 105,
            post_minutes: 60,
            tick_interval_sec: 10,
            safety_buffer: 1.2,
        }
    }

    #[test]
    fn monthly_request_volume_scales_with_windows_and_cadence() {
        // 285 covered minutes at 10s cadence = 1710 ticks per match.
        let r = params().requests_per_account_per_month();
        assert!((r - 1710.0 * 8.0 * 1.2).abs() < 1e-6);
    }

    #[test]
    fn unmetered_platform_has_no_budget_cap() {
        assert_eq!(estimate_max_accounts(100.0, None, &params()), None);
        assert_eq!(estimate_max_accounts(100.0, Some(0.0), &params()), None);
    }

    #[test]
    fn metered_platform_cap_tracks_the_budget() {
        let p = params();
        // ~16416 requests/account/month at $0.10 per 1k ≈ $1.64 per account.
        let cap = estimate_max_accounts(100.0, Some(0.10), &p).unwrap();
        assert_eq!(cap, (100.0 / (p.requests_per_account_per_month() / 1000.0 * 0.10)) as usize);
        assert!(cap > 0);

        assert_eq!(estimate_max_accounts(0.0, Some(0.10), &p), Some(0));
    }

    #[test]
    fn effective_cap_is_min_of_policy_and_budget() {
        let plan = plan_for_platform(Platform::Twitter, 40, 10.0, Some(5.0), &params());
        assert!(plan.budget_max_accounts.is_some());
        assert!(plan.effective_max_accounts <= 40);
        assert_eq!(
            plan.effective_max_accounts,
            plan.budget_max_accounts.unwrap().min(40)
        );

        let bsky = plan_for_platform(Platform::Bsky, 40, 10.0, None, &params());
        assert_eq!(bsky.budget_max_accounts, None);
        assert_eq!(bsky.effective_max_accounts, 40);
    }
}
