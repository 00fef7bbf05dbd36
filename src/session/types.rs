//! Session data types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::types::{Actor, EventType, Millis, SessionEvent};

/// State of the session recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    /// No active recording
    #[default]
    Idle,
    /// Currently recording a session
    Recording,
}

impl RecorderState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, RecorderState::Recording)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            RecorderState::Idle => "Idle",
            RecorderState::Recording => "Recording",
        }
    }
}

/// State of the session player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// At rest; position reset to zero unless a seek moved it
    #[default]
    Stopped,
    /// Ticking
    Playing,
    /// Playback paused, position retained
    Paused,
}

impl PlayerState {
    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    /// Check if paused
    pub fn is_paused(&self) -> bool {
        matches!(self, PlayerState::Paused)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerState::Stopped => "Stopped",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
        }
    }
}

/// Snapshot of a player's transient state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_paused: bool,
    /// Milliseconds relative to the recording start, within `[0, duration]`
    pub current_time: f64,
    /// Positive speed multiplier
    pub playback_speed: f64,
    /// Index of the last event at or before `current_time`
    pub current_event_index: Option<usize>,
}

/// A user associated with a recording's lifetime span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
    pub joined_at: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<Millis>,
}

impl Participant {
    /// Participant joining at `joined_at`
    pub fn joined(actor: &Actor, joined_at: Millis) -> Self {
        Self {
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            user_color: actor.user_color.clone(),
            joined_at,
            left_at: None,
        }
    }

    /// Whether the participant is still present
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }

    /// Latest instant this entry describes
    pub fn last_observed(&self) -> Millis {
        self.left_at.map_or(self.joined_at, |left| left.max(self.joined_at))
    }
}

/// Descriptive metadata for a recording
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Distinct named views visited, in first-seen order
    #[serde(default)]
    pub views: Vec<String>,
}

impl RecordingMetadata {
    /// Create new metadata with a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Record a visited view; returns false if it was already known
    pub fn add_view(&mut self, view: &str) -> bool {
        if self.views.iter().any(|v| v == view) {
            return false;
        }
        self.views.push(view.to_string());
        true
    }
}

/// Partial metadata update. Only the fields that are `Some` are replaced.
///
/// `views` is owned by the recorder's flushes and cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl MetadataPatch {
    /// Patch replacing the title
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Set tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Shallow-merge into metadata
    pub fn apply(&self, metadata: &mut RecordingMetadata) {
        if let Some(title) = &self.title {
            metadata.title = title.clone();
        }
        if let Some(tags) = &self.tags {
            metadata.tags = tags.clone();
        }
    }
}

/// A complete recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecording {
    pub id: String,
    /// Absolute start time (epoch milliseconds)
    pub start_time: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Millis>,
    /// Grows while recording; frozen at `end_time - start_time` once finalized
    pub duration: Millis,
    /// Ordered by timestamp, ties in arrival order
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub metadata: RecordingMetadata,
}

impl SessionRecording {
    /// Create an empty recording starting at `start_time`
    pub fn new(id: impl Into<String>, title: impl Into<String>, start_time: Millis) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time: None,
            duration: 0,
            events: Vec::new(),
            participants: Vec::new(),
            metadata: RecordingMetadata::new(title),
        }
    }

    /// Generate a fresh recording id
    pub fn generate_id() -> String {
        format!("rec_{}", uuid::Uuid::new_v4().simple())
    }

    /// Whether `end_time` has been set
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Get the number of events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Check if the recording has no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event timestamp relative to this recording's start
    pub fn relative_timestamp(&self, event: &SessionEvent) -> Millis {
        event.relative_to(self.start_time)
    }

    /// Index of the last event whose relative timestamp is <= `time`
    pub fn event_index_at(&self, time: f64) -> Option<usize> {
        let idx = self
            .events
            .partition_point(|e| (self.relative_timestamp(e) as f64) <= time);
        idx.checked_sub(1)
    }

    /// Check that events are in non-decreasing timestamp order
    pub fn is_ordered(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    /// Look up a participant by user id
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Add or replace a participant entry (one entry per user)
    pub fn upsert_participant(&mut self, participant: Participant) {
        match self
            .participants
            .iter_mut()
            .find(|p| p.user_id == participant.user_id)
        {
            Some(existing) => *existing = participant,
            None => self.participants.push(participant),
        }
    }

    /// Extend the duration to cover `now`; never shrinks it
    pub fn extend_duration_to(&mut self, now: Millis) {
        if self.end_time.is_none() {
            self.duration = self.duration.max(now.saturating_sub(self.start_time));
        }
    }

    /// Freeze the recording at `end_time`
    pub fn finalize(&mut self, end_time: Millis) {
        self.end_time = Some(end_time);
        self.duration = end_time.saturating_sub(self.start_time);
    }

    /// Count events by type
    pub fn event_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.event_type.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Iterate events of one type
    pub fn events_of_type(&self, event_type: EventType) -> impl Iterator<Item = &SessionEvent> {
        self.events
            .iter()
            .filter(move |e| e.event_type == event_type)
    }

    /// Save recording to a file (JSON format)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load recording from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn actor() -> Actor {
        Actor::new("u1", "Ada", "#ff0066")
    }

    fn recording_with_events(offsets: &[Millis]) -> SessionRecording {
        let mut recording = SessionRecording::new("rec-1", "Test", 1000);
        for (i, offset) in offsets.iter().enumerate() {
            recording.events.push(
                SessionEvent::new(EventType::Cursor, 1000 + offset, actor(), Value::Null)
                    .with_id(format!("e{}", i)),
            );
        }
        recording
    }

    #[test]
    fn test_state_helpers() {
        assert!(RecorderState::Recording.is_recording());
        assert!(!RecorderState::Idle.is_recording());
        assert!(PlayerState::Playing.is_playing());
        assert!(PlayerState::Paused.is_paused());
        assert_eq!(PlayerState::default(), PlayerState::Stopped);
    }

    #[test]
    fn test_event_index_at() {
        let recording = recording_with_events(&[0, 100, 300, 800, 1000]);

        assert_eq!(recording.event_index_at(0.0), Some(0));
        assert_eq!(recording.event_index_at(150.0), Some(1));
        assert_eq!(recording.event_index_at(300.0), Some(2));
        assert_eq!(recording.event_index_at(1000.0), Some(4));
    }

    #[test]
    fn test_event_index_before_first_event() {
        let recording = recording_with_events(&[100, 200]);
        assert_eq!(recording.event_index_at(50.0), None);
        assert_eq!(SessionRecording::new("r", "t", 0).event_index_at(10.0), None);
    }

    #[test]
    fn test_event_index_with_ties_selects_last_arrival() {
        let recording = recording_with_events(&[100, 100, 100, 200]);
        assert_eq!(recording.event_index_at(100.0), Some(2));
    }

    #[test]
    fn test_metadata_views_dedup_in_order() {
        let mut metadata = RecordingMetadata::new("t");
        assert!(metadata.add_view("overview"));
        assert!(metadata.add_view("charts"));
        assert!(!metadata.add_view("overview"));
        assert_eq!(metadata.views, vec!["overview", "charts"]);
    }

    #[test]
    fn test_metadata_patch_is_shallow() {
        let mut metadata = RecordingMetadata::new("old");
        metadata.add_view("overview");
        metadata.tags = vec!["a".into()];

        MetadataPatch::title("new").apply(&mut metadata);
        assert_eq!(metadata.title, "new");
        assert_eq!(metadata.tags, vec!["a"]);
        assert_eq!(metadata.views, vec!["overview"]);
    }

    #[test]
    fn test_duration_grows_then_freezes() {
        let mut recording = SessionRecording::new("rec-1", "Test", 1000);
        recording.extend_duration_to(1500);
        assert_eq!(recording.duration, 500);
        recording.extend_duration_to(1200);
        assert_eq!(recording.duration, 500);

        recording.finalize(2000);
        assert_eq!(recording.duration, 1000);
        recording.extend_duration_to(9000);
        assert_eq!(recording.duration, 1000);
    }

    #[test]
    fn test_participant_last_write_wins() {
        let mut recording = SessionRecording::new("rec-1", "Test", 0);
        recording.upsert_participant(Participant::joined(&actor(), 10));
        let mut left = Participant::joined(&actor(), 10);
        left.left_at = Some(50);
        recording.upsert_participant(left);

        assert_eq!(recording.participants.len(), 1);
        assert_eq!(recording.participant("u1").unwrap().left_at, Some(50));
        assert_eq!(recording.participant("u1").unwrap().last_observed(), 50);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.json");
        let recording = recording_with_events(&[0, 100]);

        recording.save_to_file(&path).unwrap();
        let loaded = SessionRecording::load_from_file(&path).unwrap();
        assert_eq!(loaded, recording);
    }
}
