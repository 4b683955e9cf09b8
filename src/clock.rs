//! Match clock: converts wall-clock time + kickoff into a bounded, monotonic
//! 0–90 match minute, a phase, and one of six fixed 15-minute live bins.
//!
//! The 0–90 scale collapses irregular real time: first-half stoppage and the
//! halftime break both map to minute 45, second-half stoppage maps to minute 90.
//! Every function here is total — an unparseable timestamp degrades to
//! phase=pre / minute=0 instead of raising.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{HALFTIME_MIN, POST_WINDOW_MIN, PRE_WINDOW_MIN};
use crate::types::{LiveBin, MatchPhase};

const BIN_START_MINUTES: [i64; 6] = [0, 15, 30, 45, 60, 75];
const BIN_END_MINUTES: [i64; 6] = [15, 30, 45, 60, 75, 90];

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Parse an RFC 3339 / ISO 8601 UTC timestamp string to Unix epoch milliseconds.
/// Accepts date-only strings, optional fractional seconds (millisecond precision),
/// and a trailing `Z` or numeric offset marker (offsets beyond position 19 are
/// dropped rather than applied — all inputs in this system are UTC).
pub fn parse_timestamp_ms(s: &str) -> Option<i64> {
    let s = s.trim();
    // Positional slicing below assumes one byte per char; valid timestamps
    // are pure ASCII, so anything else is malformed.
    if !s.is_ascii() {
        return None;
    }
    let s = s.strip_suffix('Z').unwrap_or(s);

    let mut frac_ms: i64 = 0;
    let s = if let Some(dot) = s.find('.') {
        let frac = &s[dot + 1..];
        let digits: String = frac.chars().take_while(|c| c.is_ascii_digit()).take(3).collect();
        if !digits.is_empty() {
            let scale = 10_i64.pow(3 - digits.len() as u32);
            frac_ms = digits.parse::<i64>().ok()? * scale;
        }
        &s[..dot]
    } else {
        s
    };
    let s = if s.len() > 19 {
        let b = s.as_bytes()[19];
        if b == b'+' || b == b'-' {
            &s[..19]
        } else {
            s
        }
    } else {
        s
    };

    let (year, month, day, hour, minute, second): (i64, i64, i64, i64, i64, i64) = if s.len() == 10 {
        (s[0..4].parse().ok()?, s[5..7].parse().ok()?, s[8..10].parse().ok()?, 0, 0, 0)
    } else if s.len() >= 19 {
        (
            s[0..4].parse().ok()?,
            s[5..7].parse().ok()?,
            s[8..10].parse().ok()?,
            s[11..13].parse().ok()?,
            s[14..16].parse().ok()?,
            s[17..19].parse().ok()?,
        )
    } else {
        return None;
    };

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    let jdn = day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045;
    let unix_days = jdn - 2_440_588;
    Some((unix_days * 86_400 + hour * 3600 + minute * 60 + second) * 1000 + frac_ms)
}

/// Shared fail-open degradation: every caller that can tolerate a bad timestamp
/// goes through here so the fallback semantics stay identical.
pub fn parse_timestamp_or(s: &str, fallback_ms: i64) -> i64 {
    parse_timestamp_ms(s).unwrap_or(fallback_ms)
}

/// Format Unix epoch milliseconds as an RFC 3339 UTC string with millisecond precision.
pub fn format_timestamp_ms(ms: i64) -> String {
    let (secs, millis) = (ms.div_euclid(1000), ms.rem_euclid(1000));
    let days = secs.div_euclid(86_400);
    let secs_of_day = secs.rem_euclid(86_400);

    // Civil-from-days (Gregorian), valid for the full i64 day range we care about.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        m,
        d,
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60,
        millis,
    )
}

/// Normalized match minute in [0, 90].
///
/// Rules, in order of real elapsed minutes since kickoff:
/// - elapsed ≤ 45: first half, minutes map directly (floored).
/// - 45 < elapsed ≤ 45 + halftime: first-half stoppage and the halftime break
///   collapse to exactly 45.
/// - elapsed > 45 + halftime: second half, halftime is subtracted and the result
///   capped at 90 (collapses second-half stoppage).
///
/// Unparseable kickoff returns 0 (not yet started).
pub fn effective_match_minute(kickoff_iso: &str, now_ms: i64, halftime_min: i64) -> i64 {
    let Some(kickoff_ms) = parse_timestamp_ms(kickoff_iso) else {
        return 0;
    };
    let elapsed_min = ((now_ms - kickoff_ms) as f64 / 60_000.0).max(0.0);

    if elapsed_min <= 45.0 {
        return (elapsed_min.floor() as i64).clamp(0, 45);
    }
    if elapsed_min <= (45 + halftime_min) as f64 {
        return 45;
    }
    ((elapsed_min - halftime_min as f64).floor() as i64).clamp(45, 90)
}

/// Map a match minute back to real elapsed minutes since kickoff, re-inserting
/// the halftime gap for second-half minutes. Used to compute bin start times.
pub fn map_match_minute_to_elapsed_minutes(match_minute: i64, halftime_min: i64) -> i64 {
    if match_minute <= 45 {
        match_minute
    } else {
        match_minute + halftime_min
    }
}

/// The fixed 15-minute live bin containing the current match minute.
///
/// Minute 45 is ambiguous between the 30–45 bin and the 45–60 bin: while real
/// elapsed time is still within first-half stoppage or halftime the match has
/// not entered the second half, so the bin is forced to index 2 (30–45).
pub fn get_live_bin(kickoff_iso: &str, now_ms: i64, halftime_min: i64) -> LiveBin {
    let kickoff_ms = parse_timestamp_or(kickoff_iso, now_ms);
    let mm = effective_match_minute(kickoff_iso, now_ms, halftime_min);
    let elapsed_min = ((now_ms - kickoff_ms) as f64 / 60_000.0).max(0.0);

    let mut index = ((mm / 15) as usize).min(5);
    if mm == 45 && elapsed_min <= (45 + halftime_min) as f64 {
        index = 2;
    }

    let start_minute = BIN_START_MINUTES[index];
    LiveBin {
        index,
        start_minute,
        end_minute: BIN_END_MINUTES[index],
        bin_start_ms: kickoff_ms
            + map_match_minute_to_elapsed_minutes(start_minute, halftime_min) * 60_000,
    }
}

/// Phase of the match relative to wall-clock `now_ms`.
///
/// Unparseable kickoff returns `Pre`, consistent with `effective_match_minute`
/// treating the match as not yet started.
pub fn get_window_state(kickoff_iso: &str, now_ms: i64, live_duration_min: i64) -> MatchPhase {
    let Some(kickoff_ms) = parse_timestamp_ms(kickoff_iso) else {
        return MatchPhase::Pre;
    };

    let pre_start = kickoff_ms - PRE_WINDOW_MIN * 60_000;
    let live_end = kickoff_ms + live_duration_min * 60_000;
    let post_end = live_end + POST_WINDOW_MIN * 60_000;

    if now_ms < pre_start {
        // Before the pre-window opens the phase label is still "pre"; callers
        // decide whether to start streaming.
        return MatchPhase::Pre;
    }
    if now_ms < kickoff_ms {
        MatchPhase::Pre
    } else if now_ms < live_end {
        MatchPhase::Live
    } else if now_ms < post_end {
        MatchPhase::Post
    } else {
        MatchPhase::Ended
    }
}

/// The pre-match window always opens 120 minutes before kickoff.
pub fn pre_window_start_ms(kickoff_iso: &str, now_ms: i64) -> i64 {
    parse_timestamp_or(kickoff_iso, now_ms) - PRE_WINDOW_MIN * 60_000
}

/// The post-match window starts at the final whistle when one is supplied and
/// parseable, else at kickoff + 90 + halftime real minutes.
pub fn post_window_start_ms(kickoff_iso: &str, final_whistle_iso: Option<&str>, now_ms: i64) -> i64 {
    if let Some(fw) = final_whistle_iso {
        if let Some(fw_ms) = parse_timestamp_ms(fw) {
            return fw_ms;
        }
    }
    parse_timestamp_or(kickoff_iso, now_ms) + (90 + HALFTIME_MIN) * 60_000
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
