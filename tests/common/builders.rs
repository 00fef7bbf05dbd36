//! Test data builders for creating test objects

use serde_json::{json, Value};
use session_replay::{
    session::Participant, EventType, Millis, SessionEvent, SessionRecording,
};

use super::actor;

/// Builder for creating test recordings.
///
/// Event offsets are relative to the start time; event ids are `e0`, `e1`, ...
/// in the order they were added.
pub struct RecordingBuilder {
    id: String,
    title: String,
    start_time: Millis,
    events: Vec<(EventType, Millis, Value)>,
    participants: Vec<&'static str>,
    end_offset: Option<Millis>,
}

impl RecordingBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: "Test recording".to_string(),
            start_time: 1000,
            events: Vec::new(),
            participants: vec!["u1"],
            end_offset: None,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn start_time(mut self, start_time: Millis) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn event(mut self, event_type: EventType, offset: Millis) -> Self {
        self.events.push((event_type, offset, json!({})));
        self
    }

    pub fn view_change(mut self, offset: Millis, view: &str) -> Self {
        self.events
            .push((EventType::TabChange, offset, json!({ "view": view })));
        self
    }

    pub fn participant(mut self, user_id: &'static str) -> Self {
        self.participants.push(user_id);
        self
    }

    pub fn finalized_at(mut self, offset: Millis) -> Self {
        self.end_offset = Some(offset);
        self
    }

    pub fn build(self) -> SessionRecording {
        let mut recording = SessionRecording::new(self.id, self.title, self.start_time);
        for user_id in self.participants {
            recording.upsert_participant(Participant::joined(&actor(user_id), self.start_time));
        }
        for (i, (event_type, offset, payload)) in self.events.into_iter().enumerate() {
            let timestamp = self.start_time + offset;
            if let Some(view) = payload.get("view").and_then(Value::as_str) {
                recording.metadata.add_view(view);
            }
            recording.events.push(
                SessionEvent::new(event_type, timestamp, actor("u1"), payload)
                    .with_id(format!("e{}", i)),
            );
            recording.extend_duration_to(timestamp);
        }
        if let Some(offset) = self.end_offset {
            recording.finalize(self.start_time + offset);
        }
        recording
    }
}

/// The canonical scenario: start at 1000, cursor at 1100, click at 1300,
/// scroll at 1800, stopped at 2000, with start/stop interaction events
pub fn scenario_recording(id: &str) -> SessionRecording {
    RecordingBuilder::new(id)
        .event(EventType::Interaction, 0)
        .event(EventType::Cursor, 100)
        .event(EventType::Click, 300)
        .event(EventType::Scroll, 800)
        .event(EventType::Interaction, 1000)
        .finalized_at(1000)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_builder() {
        let recording = RecordingBuilder::new("rec-1")
            .start_time(500)
            .event(EventType::Click, 10)
            .view_change(20, "charts")
            .finalized_at(30)
            .build();

        assert_eq!(recording.events.len(), 2);
        assert_eq!(recording.events[1].timestamp, 520);
        assert_eq!(recording.metadata.views, vec!["charts"]);
        assert_eq!(recording.duration, 30);
    }
}
