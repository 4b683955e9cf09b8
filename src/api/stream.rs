//! Live SSE tick stream. Each event carries a full TickSummary plus the
//! match-clock position when a kickoff is supplied. Connections are soft-
//! capped in duration; clients are expected to reconnect.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::clock::{
    effective_match_minute, get_live_bin, get_window_state, now_ms, post_window_start_ms,
    pre_window_start_ms,
};
use crate::config::{DEFAULT_LIVE_DURATION_MIN, HALFTIME_MIN, STREAM_MAX_DURATION_SECS};
use crate::types::{MatchPhase, MatchSchedule};

use super::routes::{parse_phase, ApiState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub match_id: Option<String>,
    /// Kickoff RFC 3339 timestamp; enables phase and bin derivation.
    pub kickoff: Option<String>,
    pub live_duration_minutes: Option<i64>,
    pub halftime_minutes: Option<i64>,
    /// Explicit phase, used when no kickoff is supplied.
    pub window: Option<String>,
    pub interval_sec: Option<u64>,
    pub minutes: Option<i64>,
    pub final_whistle: Option<String>,
}

impl StreamQuery {
    /// Pin down the schedule once per connection; defaults fill any gaps.
    fn schedule(&self) -> Option<MatchSchedule> {
        let kickoff = self.kickoff.clone()?;
        Some(MatchSchedule {
            kickoff,
            live_duration_minutes: self
                .live_duration_minutes
                .filter(|d| *d > 0)
                .unwrap_or(DEFAULT_LIVE_DURATION_MIN),
            halftime_minutes: self.halftime_minutes.filter(|h| *h >= 0).unwrap_or(HALFTIME_MIN),
            final_whistle: self.final_whistle.clone(),
        })
    }
}

struct StreamState {
    api: ApiState,
    query: StreamQuery,
    tick: u64,
    started_ms: i64,
}

pub async fn live_stream(
    State(api): State<ApiState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!(
        match_id = query.match_id.as_deref().unwrap_or("adhoc"),
        kickoff = query.kickoff.as_deref().unwrap_or("-"),
        "[STREAM] client connected"
    );

    let state = StreamState { api, query, tick: 0, started_ms: now_ms() };
    let stream = stream::unfold(state, |mut state| async move {
        if state.tick > 0 {
            let interval = state
                .query
                .interval_sec
                .filter(|s| *s >= 1)
                .unwrap_or(state.api.cfg.tick_interval_sec);
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }

        if now_ms() - state.started_ms >= STREAM_MAX_DURATION_SECS as i64 * 1000 {
            info!("[STREAM] connection cap reached, closing");
            return None;
        }

        let event = next_event(&mut state).await?;
        Some((Ok(event), state))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn next_event(state: &mut StreamState) -> Option<Event> {
    let now = now_ms();
    let match_id = state.query.match_id.clone().unwrap_or_else(|| "adhoc".to_string());

    // A supplied kickoff pins a schedule that drives the phase; an explicit
    // window wins otherwise.
    let (phase, clock) = match state.query.schedule() {
        Some(schedule) => {
            let phase = get_window_state(&schedule.kickoff, now, schedule.live_duration_minutes);
            let clock = match phase {
                MatchPhase::Live => {
                    let minute =
                        effective_match_minute(&schedule.kickoff, now, schedule.halftime_minutes);
                    let bin = get_live_bin(&schedule.kickoff, now, schedule.halftime_minutes);
                    Some(json!({ "minute": minute, "bin": bin }))
                }
                MatchPhase::Pre => Some(json!({
                    "preWindowStartMs": pre_window_start_ms(&schedule.kickoff, now),
                })),
                MatchPhase::Post => Some(json!({
                    "postWindowStartMs": post_window_start_ms(
                        &schedule.kickoff,
                        schedule.final_whistle.as_deref(),
                        now,
                    ),
                })),
                MatchPhase::Ended => None,
            };
            (phase, clock)
        }
        None => {
            let phase = state
                .query
                .window
                .as_deref()
                .and_then(parse_phase)
                .unwrap_or(MatchPhase::Live);
            (phase, None)
        }
    };

    if phase == MatchPhase::Ended {
        info!(match_id = %match_id, "[STREAM] match ended, closing");
        return None;
    }

    let minutes = state
        .query
        .minutes
        .filter(|m| *m > 0)
        .unwrap_or(state.api.cfg.recency_minutes);
    let summary = state
        .api
        .builder
        .build_tick(&match_id, phase, state.tick, minutes)
        .await;
    state.tick += 1;

    if state.api.pool.is_some() {
        if let Err(e) = state.api.tick_tx.try_send(summary.clone()) {
            warn!("[STREAM] tick persistence channel full, dropping: {e}");
        }
    }

    let payload = json!({ "summary": summary, "clock": clock });
    match Event::default().event("tick").json_data(&payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("[STREAM] event serialization failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(kickoff: Option<&str>) -> StreamQuery {
        StreamQuery {
            match_id: Some("ars-che-2025".to_string()),
            kickoff: kickoff.map(|s| s.to_string()),
            live_duration_minutes: None,
            halftime_minutes: None,
            window: None,
            interval_sec: None,
            minutes: None,
            final_whistle: None,
        }
    }

    #[test]
    fn kickoff_pins_a_schedule_with_defaults() {
        let schedule = query(Some("2025-10-19T11:30:00Z")).schedule().unwrap();
        assert_eq!(schedule.kickoff, "2025-10-19T11:30:00Z");
        assert_eq!(schedule.live_duration_minutes, DEFAULT_LIVE_DURATION_MIN);
        assert_eq!(schedule.halftime_minutes, HALFTIME_MIN);
        assert!(schedule.final_whistle.is_none());
    }

    #[test]
    fn explicit_schedule_params_override_defaults() {
        let mut q = query(Some("2025-10-19T11:30:00Z"));
        q.live_duration_minutes = Some(110);
        q.halftime_minutes = Some(20);
        q.final_whistle = Some("2025-10-19T13:20:00Z".to_string());
        let schedule = q.schedule().unwrap();
        assert_eq!(schedule.live_duration_minutes, 110);
        assert_eq!(schedule.halftime_minutes, 20);
        assert_eq!(schedule.final_whistle.as_deref(), Some("2025-10-19T13:20:00Z"));

        // Nonsense durations fall back rather than propagate.
        let mut q = query(Some("2025-10-19T11:30:00Z"));
        q.live_duration_minutes = Some(0);
        assert_eq!(q.schedule().unwrap().live_duration_minutes, DEFAULT_LIVE_DURATION_MIN);
    }

    #[test]
    fn no_kickoff_means_no_schedule() {
        assert!(query(None).schedule().is_none());
    }
}
