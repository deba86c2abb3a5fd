//! Elapsed active time derived from a session's event log.
//!
//! Heartbeats arrive roughly every 20 seconds while the quiz tab is open, so
//! the time between two events is only trusted when a heartbeat window or an
//! explicit end covers it. A resume after an unexplained gap is credited with
//! at most one heartbeat interval.

use crate::models::{EventType, SessionEvent};
use crate::utils::time::{round_to_hundredths, seconds_between};

/// Longest gap, in seconds, credited to a resume event.
pub const RESUME_GAP_CAP_SECS: f64 = 20.0;

/// Total active seconds in `events`, rounded to two decimals.
///
/// `None` when the log is empty or does not open with a start event; callers
/// must not read that as zero.
pub fn compute_time_spent(events: &[SessionEvent]) -> Option<f64> {
    let (first, rest) = events.split_first()?;
    if first.event_type != EventType::Start {
        return None;
    }

    let mut total = 0.0;
    let mut previous = first;
    for event in rest {
        total += contribution(previous, event);
        previous = event;
    }

    Some(round_to_hundredths(total))
}

/// `max(0, time_limit_max - total_time_spent)` in whole seconds.
pub fn derive_time_remaining(time_limit_max: u64, total_time_spent: f64) -> u64 {
    // `as` saturates: NaN and negatives become 0.
    let spent = total_time_spent.max(0.0).floor() as u64;
    time_limit_max.saturating_sub(spent)
}

/// Seconds `current` adds on top of a log whose last event is `previous`.
pub fn contribution(previous: &SessionEvent, current: &SessionEvent) -> f64 {
    let gap = non_negative(seconds_between(current.created_at, previous.end_time()));

    match current.event_type {
        EventType::Heartbeat => {
            let window = non_negative(seconds_between(current.end_time(), current.created_at));
            if previous.event_type == EventType::Heartbeat {
                window
            } else {
                gap + window
            }
        }
        EventType::Resume => gap.min(RESUME_GAP_CAP_SECS),
        EventType::End => gap,
        EventType::Start => 0.0,
    }
}

/// Appends `event` to `events`, squashing consecutive heartbeats into one
/// widening window, and returns the seconds the append adds to the total.
///
/// The returned increment always equals the difference between
/// [`compute_time_spent`] on the log after and before the call.
pub fn record_event(events: &mut Vec<SessionEvent>, event: SessionEvent) -> f64 {
    let Some(last) = events.last_mut() else {
        events.push(event);
        return 0.0;
    };

    if last.event_type == EventType::Heartbeat && event.event_type == EventType::Heartbeat {
        let extension = non_negative(seconds_between(event.created_at, last.end_time()));
        if event.created_at > last.end_time() {
            last.updated_at = Some(event.created_at);
        }
        return extension;
    }

    let added = contribution(last, &event);
    events.push(event);
    added
}

fn non_negative(seconds: f64) -> f64 {
    seconds.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn event(event_type: EventType, secs: i64) -> SessionEvent {
        SessionEvent::new(event_type, at(secs))
    }

    fn heartbeat(created: i64, updated: i64) -> SessionEvent {
        SessionEvent {
            event_type: EventType::Heartbeat,
            created_at: at(created),
            updated_at: Some(at(updated)),
        }
    }

    #[test]
    fn empty_log_is_undefined() {
        assert_eq!(compute_time_spent(&[]), None);
    }

    #[test]
    fn log_not_opening_with_start_is_undefined() {
        let events = vec![event(EventType::Resume, 0), event(EventType::End, 30)];
        assert_eq!(compute_time_spent(&events), None);
    }

    #[test]
    fn lone_start_is_zero_not_undefined() {
        assert_eq!(compute_time_spent(&[event(EventType::Start, 0)]), Some(0.0));
    }

    #[test]
    fn heartbeat_window_then_end_adds_up() {
        let events = vec![
            event(EventType::Start, 0),
            heartbeat(10, 40),
            event(EventType::End, 55),
        ];
        assert_eq!(compute_time_spent(&events), Some(55.0));
    }

    #[test]
    fn resume_after_long_gap_is_capped() {
        let events = vec![event(EventType::Start, 0), event(EventType::Resume, 9000)];
        assert_eq!(compute_time_spent(&events), Some(20.0));
    }

    #[test]
    fn resume_after_short_gap_counts_fully() {
        let events = vec![event(EventType::Start, 0), event(EventType::Resume, 7)];
        assert_eq!(compute_time_spent(&events), Some(7.0));
    }

    #[test]
    fn end_gap_is_not_capped() {
        let events = vec![event(EventType::Start, 0), event(EventType::End, 600)];
        assert_eq!(compute_time_spent(&events), Some(600.0));
    }

    #[test]
    fn heartbeat_after_heartbeat_only_adds_its_window() {
        let events = vec![
            event(EventType::Start, 0),
            heartbeat(5, 15),
            heartbeat(20, 35),
            event(EventType::End, 40),
        ];
        // 5 + 10 for the first window, 15 for the second, 5 up to the end.
        assert_eq!(compute_time_spent(&events), Some(35.0));
    }

    #[test]
    fn clock_skew_never_makes_time_negative() {
        let events = vec![event(EventType::Start, 100), event(EventType::End, 40)];
        assert_eq!(compute_time_spent(&events), Some(0.0));
    }

    #[test]
    fn sub_second_resolution_is_kept_to_two_decimals() {
        let start = SessionEvent::new(EventType::Start, t0());
        let end = SessionEvent::new(EventType::End, t0() + Duration::milliseconds(12_346));
        assert_eq!(compute_time_spent(&[start, end]), Some(12.35));
    }

    #[test]
    fn time_remaining_never_negative() {
        assert_eq!(derive_time_remaining(600, 120.7), 480);
        assert_eq!(derive_time_remaining(600, 600.0), 0);
        assert_eq!(derive_time_remaining(600, 9_999.0), 0);
        assert_eq!(derive_time_remaining(0, 0.0), 0);
        assert_eq!(derive_time_remaining(60, -5.0), 60);
        assert_eq!(derive_time_remaining(60, f64::NAN), 60);
    }

    #[test]
    fn consecutive_heartbeats_collapse_into_one_entry() {
        let mut events = vec![event(EventType::Start, 0)];
        for n in 1..=25 {
            record_event(&mut events, event(EventType::Heartbeat, n * 20));
        }

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].created_at, at(20));
        assert_eq!(events[1].updated_at, Some(at(500)));
    }

    #[test]
    fn incremental_total_matches_replay() {
        let mut events = Vec::new();
        let mut running = 0.0;
        let script = [
            (EventType::Start, 0),
            (EventType::Heartbeat, 20),
            (EventType::Heartbeat, 40),
            (EventType::Heartbeat, 60),
            (EventType::Resume, 4_000),
            (EventType::Heartbeat, 4_010),
            (EventType::Heartbeat, 4_030),
            (EventType::End, 4_042),
        ];
        for (event_type, secs) in script {
            running += record_event(&mut events, event(event_type, secs));
        }

        // 60 before the idle gap, 20 for the resume, 42 after it.
        assert_eq!(compute_time_spent(&events), Some(122.0));
        assert_eq!(round_to_hundredths(running), 122.0);
    }

    #[test]
    fn out_of_order_heartbeat_does_not_shrink_window() {
        let mut events = vec![event(EventType::Start, 0), heartbeat(10, 40)];
        let added = record_event(&mut events, event(EventType::Heartbeat, 30));

        assert_eq!(added, 0.0);
        assert_eq!(events[1].updated_at, Some(at(40)));
    }
}
