//! Merge rules for concurrent and repeated upserts
//!
//! Flushes are delivered at least once and may overlap, and several writers
//! can target the same backing store. Merging an incoming snapshot into a
//! stored recording therefore has to absorb duplicates and must not depend
//! on arrival order for anything but tie-breaking:
//!
//! - `events`: union by event id, stable-sorted by timestamp (ties keep the
//!   stored order, then incoming order)
//! - `duration`: max of both
//! - `participants`: union by user id, the later observation wins
//! - `metadata.views`: union in first-seen order
//! - `metadata.title` / `metadata.tags`: owned by metadata updates; a flush
//!   only fills them in when the stored value is empty

use std::collections::HashSet;

use crate::session::types::{Participant, SessionRecording};
use crate::types::SessionEvent;

/// Merge `incoming` into `stored` in place
pub fn merge_recording(stored: &mut SessionRecording, incoming: SessionRecording) {
    let SessionRecording {
        start_time,
        end_time,
        duration,
        events,
        participants,
        metadata,
        ..
    } = incoming;

    stored.start_time = stored.start_time.min(start_time);
    stored.end_time = match (stored.end_time, end_time) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    stored.duration = stored.duration.max(duration);

    merge_events(&mut stored.events, events);
    merge_participants(&mut stored.participants, participants);

    if stored.metadata.title.is_empty() {
        stored.metadata.title = metadata.title;
    }
    if stored.metadata.tags.is_empty() {
        stored.metadata.tags = metadata.tags;
    }
    for view in &metadata.views {
        stored.metadata.add_view(view);
    }
}

/// Union events by id and restore timestamp order
pub fn merge_events(stored: &mut Vec<SessionEvent>, incoming: Vec<SessionEvent>) {
    let mut seen: HashSet<String> = HashSet::with_capacity(stored.len() + incoming.len());
    stored.retain(|e| seen.insert(e.id.clone()));

    let before = stored.len();
    for event in incoming {
        if seen.insert(event.id.clone()) {
            stored.push(event);
        }
    }

    let appended_in_order = stored.len() == before
        || before == 0
        || stored[before - 1].timestamp <= stored[before].timestamp;
    if !appended_in_order || !is_sorted(&stored[before..]) {
        // stable: equal timestamps keep arrival order
        stored.sort_by_key(|e| e.timestamp);
    }
}

fn is_sorted(events: &[SessionEvent]) -> bool {
    events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

/// Union participants by user id; the entry observed later wins
pub fn merge_participants(stored: &mut Vec<Participant>, incoming: Vec<Participant>) {
    for candidate in incoming {
        match stored.iter_mut().find(|p| p.user_id == candidate.user_id) {
            Some(existing) => {
                if supersedes(&candidate, existing) {
                    *existing = candidate;
                }
            }
            None => stored.push(candidate),
        }
    }
}

fn supersedes(candidate: &Participant, existing: &Participant) -> bool {
    match candidate.last_observed().cmp(&existing.last_observed()) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        // a closed span carries more information than an open one
        std::cmp::Ordering::Equal => candidate.left_at.is_some() && existing.left_at.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, EventType};
    use serde_json::Value;

    fn actor() -> Actor {
        Actor::new("u1", "Ada", "#ff0066")
    }

    fn event(id: &str, ts: u64) -> SessionEvent {
        SessionEvent::new(EventType::Click, ts, actor(), Value::Null).with_id(id)
    }

    fn ids(events: &[SessionEvent]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_duplicate_events_collapse() {
        let mut stored = vec![event("a", 1), event("b", 2)];
        merge_events(&mut stored, vec![event("b", 2), event("c", 3)]);
        assert_eq!(ids(&stored), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_late_events_are_placed_by_timestamp() {
        let mut stored = vec![event("a", 10), event("c", 30)];
        merge_events(&mut stored, vec![event("b", 20)]);
        assert_eq!(ids(&stored), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut stored = vec![event("x", 5), event("y", 10)];
        merge_events(&mut stored, vec![event("a", 5), event("b", 10)]);
        assert_eq!(ids(&stored), vec!["x", "a", "y", "b"]);
    }

    #[test]
    fn test_participant_later_observation_wins() {
        let mut joined = Participant::joined(&actor(), 100);
        let mut left = joined.clone();
        left.left_at = Some(900);

        let mut stored = vec![left.clone()];
        merge_participants(&mut stored, vec![joined.clone()]);
        assert_eq!(stored, vec![left.clone()]);

        let mut stored = vec![joined.clone()];
        merge_participants(&mut stored, vec![left.clone()]);
        assert_eq!(stored, vec![left]);

        // re-join after leaving replaces the closed span
        joined.joined_at = 1200;
        merge_participants(&mut stored, vec![joined.clone()]);
        assert_eq!(stored, vec![joined]);
    }

    #[test]
    fn test_recording_merge_rules() {
        let mut stored = SessionRecording::new("rec-1", "Renamed", 1000);
        stored.duration = 400;
        stored.events = vec![event("a", 1100)];
        stored.metadata.add_view("overview");

        let mut incoming = SessionRecording::new("rec-1", "Original", 1000);
        incoming.duration = 250;
        incoming.events = vec![event("a", 1100), event("b", 1200)];
        incoming.metadata.add_view("charts");
        incoming.metadata.add_view("overview");
        incoming.participants = vec![Participant::joined(&actor(), 1000)];

        merge_recording(&mut stored, incoming);

        assert_eq!(stored.duration, 400);
        assert_eq!(ids(&stored.events), vec!["a", "b"]);
        assert_eq!(stored.metadata.title, "Renamed");
        assert_eq!(stored.metadata.views, vec!["overview", "charts"]);
        assert_eq!(stored.participants.len(), 1);
    }

    #[test]
    fn test_end_time_takes_latest() {
        let mut stored = SessionRecording::new("rec-1", "t", 0);
        let mut incoming = stored.clone();
        incoming.finalize(500);

        merge_recording(&mut stored, incoming);
        assert_eq!(stored.end_time, Some(500));
        assert_eq!(stored.duration, 500);
    }
}
