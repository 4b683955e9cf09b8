//! Override precedence resolution.
//!
//! Admin override rows force accounts in or out of selection. Precedence is
//! positional: match-scoped rows are evaluated before global rows, and the
//! first row seen for a given `identifier_type|identifier` key wins — so any
//! match-scoped row (include or exclude) beats any global row for the same
//! identity. There is no sub-sorting by action within a scope.

use std::collections::HashSet;

use crate::clock::parse_timestamp_ms;
use crate::types::{AccountOverride, EffectiveOverrides, OverrideAction, OverrideScope};

/// A row is expired iff `expires_at` parses and is ≤ now.
/// An unparseable `expires_at` is treated as non-expiring (fail open).
fn not_expired(row: &AccountOverride, now_ms: i64) -> bool {
    let Some(raw) = row.expires_at.as_deref() else {
        return true;
    };
    match parse_timestamp_ms(raw) {
        Some(exp_ms) => exp_ms > now_ms,
        None => true,
    }
}

/// Collapse raw override rows into effective include/exclude lists for one match.
///
/// `match_id=None` matches rows whose own `match_id` is also null.
pub fn resolve_overrides(
    rows: &[AccountOverride],
    match_id: Option<&str>,
    now_ms: i64,
) -> EffectiveOverrides {
    let active: Vec<&AccountOverride> = rows.iter().filter(|r| not_expired(r, now_ms)).collect();

    let match_rows = active
        .iter()
        .filter(|r| r.scope == OverrideScope::Match && r.match_id.as_deref() == match_id);
    let global_rows = active.iter().filter(|r| r.scope == OverrideScope::Global);

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = EffectiveOverrides::default();

    for row in match_rows.chain(global_rows) {
        let key = row.identity_key();
        if !seen.insert(key) {
            continue;
        }
        match row.action {
            OverrideAction::Exclude => out.exclude.push((*row).clone()),
            OverrideAction::Include => out.include.push((*row).clone()),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdentifierType, Platform};

    fn row(
        id: &str,
        identifier: &str,
        action: OverrideAction,
        scope: OverrideScope,
        match_id: Option<&str>,
        expires_at: Option<&str>,
    ) -> AccountOverride {
        AccountOverride {
            id: id.to_string(),
            platform: Platform::Bsky,
            identifier_type: IdentifierType::Handle,
            identifier: identifier.to_string(),
            handle: Some(identifier.to_string()),
            action,
            scope,
            match_id: match_id.map(|s| s.to_string()),
            bypass_eligibility: true,
            notes: None,
            expires_at: expires_at.map(|s| s.to_string()),
            created_by: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn match_include_beats_global_exclude() {
        let rows = vec![
            row("g1", "fan.bsky.social", OverrideAction::Exclude, OverrideScope::Global, None, None),
            row(
                "m1",
                "fan.bsky.social",
                OverrideAction::Include,
                OverrideScope::Match,
                Some("ars-che-2025"),
                None,
            ),
        ];
        let eff = resolve_overrides(&rows, Some("ars-che-2025"), NOW);
        assert_eq!(eff.include.len(), 1);
        assert_eq!(eff.include[0].id, "m1");
        assert!(eff.exclude.is_empty());
    }

    #[test]
    fn match_exclude_beats_global_include() {
        let rows = vec![
            row("g1", "fan.bsky.social", OverrideAction::Include, OverrideScope::Global, None, None),
            row(
                "m1",
                "fan.bsky.social",
                OverrideAction::Exclude,
                OverrideScope::Match,
                Some("ars-che-2025"),
                None,
            ),
        ];
        let eff = resolve_overrides(&rows, Some("ars-che-2025"), NOW);
        assert!(eff.include.is_empty());
        assert_eq!(eff.exclude.len(), 1);
        assert_eq!(eff.exclude[0].id, "m1");
    }

    #[test]
    fn match_rows_for_other_matches_are_ignored() {
        let rows = vec![
            row(
                "m1",
                "fan.bsky.social",
                OverrideAction::Exclude,
                OverrideScope::Match,
                Some("other-match"),
                None,
            ),
            row("g1", "fan.bsky.social", OverrideAction::Include, OverrideScope::Global, None, None),
        ];
        let eff = resolve_overrides(&rows, Some("ars-che-2025"), NOW);
        assert_eq!(eff.include.len(), 1);
        assert_eq!(eff.include[0].id, "g1");
        assert!(eff.exclude.is_empty());
    }

    #[test]
    fn null_match_id_matches_null_scoped_rows() {
        let rows = vec![row(
            "m1",
            "fan.bsky.social",
            OverrideAction::Include,
            OverrideScope::Match,
            None,
            None,
        )];
        let eff = resolve_overrides(&rows, None, NOW);
        assert_eq!(eff.include.len(), 1);
        let eff = resolve_overrides(&rows, Some("ars-che-2025"), NOW);
        assert!(eff.include.is_empty());
    }

    #[test]
    fn expired_rows_never_appear() {
        let rows = vec![
            row(
                "g1",
                "fan.bsky.social",
                OverrideAction::Exclude,
                OverrideScope::Global,
                None,
                Some("2020-01-01T00:00:00Z"),
            ),
            row(
                "g2",
                "other.bsky.social",
                OverrideAction::Include,
                OverrideScope::Global,
                None,
                Some("2030-01-01T00:00:00Z"),
            ),
        ];
        let eff = resolve_overrides(&rows, None, NOW);
        assert!(eff.exclude.is_empty());
        assert_eq!(eff.include.len(), 1);
        assert_eq!(eff.include[0].id, "g2");
    }

    #[test]
    fn unparseable_expiry_is_non_expiring() {
        let rows = vec![row(
            "g1",
            "fan.bsky.social",
            OverrideAction::Include,
            OverrideScope::Global,
            None,
            Some("whenever"),
        )];
        let eff = resolve_overrides(&rows, None, NOW);
        assert_eq!(eff.include.len(), 1);
    }

    #[test]
    fn first_occurrence_wins_within_a_scope() {
        let rows = vec![
            row("g1", "fan.bsky.social", OverrideAction::Include, OverrideScope::Global, None, None),
            row("g2", "fan.bsky.social", OverrideAction::Exclude, OverrideScope::Global, None, None),
        ];
        let eff = resolve_overrides(&rows, None, NOW);
        assert_eq!(eff.include.len(), 1);
        assert_eq!(eff.include[0].id, "g1");
        assert!(eff.exclude.is_empty());
    }

    #[test]
    fn identity_key_is_type_qualified() {
        // Same identifier string under a different identifier_type is a different key.
        let mut did_row =
            row("g1", "someone", OverrideAction::Include, OverrideScope::Global, None, None);
        did_row.identifier_type = IdentifierType::Did;
        let handle_row =
            row("g2", "someone", OverrideAction::Exclude, OverrideScope::Global, None, None);
        let eff = resolve_overrides(&[did_row, handle_row], None, NOW);
        assert_eq!(eff.include.len(), 1);
        assert_eq!(eff.exclude.len(), 1);
    }
}
