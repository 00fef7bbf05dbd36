//! Persistent recording store
//!
//! [`RecordingStore`] layers create-or-merge semantics over a plain
//! [`KeyValue`] backend. Repeated or overlapping upserts for the same id are
//! absorbed by the merge rules in [`merge`], and metadata updates only touch
//! the fields they own, so a metadata edit racing a flush never clobbers the
//! flush's events (or vice versa).
//!
//! # Keys
//!
//! - `recording:<id>` - one JSON document per recording
//! - `recordings:index` - JSON array of known recording ids
//! - `markers:<id>` - annotations and bookmarks for a recording
//!
//! The [`worker`] submodule moves a store onto its own execution context so
//! that callers never block on store I/O.

pub mod kv;
pub mod merge;
pub mod worker;

pub use kv::{FileKv, KeyValue, MemoryKv};
pub use merge::merge_recording;
pub use worker::{PendingReply, StoreClient, StoreCommand, StoreWorker};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ReplayError, Result, ResultExt};
use crate::markers::{Annotation, Author, Bookmark, NewAnnotation, Reply, TimelineMarkers};
use crate::session::types::{MetadataPatch, SessionRecording};
use crate::types::Millis;

const INDEX_KEY: &str = "recordings:index";

fn recording_key(id: &str) -> String {
    format!("recording:{}", id)
}

fn markers_key(id: &str) -> String {
    format!("markers:{}", id)
}

/// Short description of a stored recording for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub id: String,
    pub title: String,
    pub start_time: Millis,
    pub duration: Millis,
    pub event_count: usize,
    pub participant_count: usize,
    pub finalized: bool,
}

impl From<&SessionRecording> for RecordingSummary {
    fn from(recording: &SessionRecording) -> Self {
        Self {
            id: recording.id.clone(),
            title: recording.metadata.title.clone(),
            start_time: recording.start_time,
            duration: recording.duration,
            event_count: recording.events.len(),
            participant_count: recording.participants.len(),
            finalized: recording.is_finalized(),
        }
    }
}

/// Merge-oriented store of session recordings
#[derive(Debug)]
pub struct RecordingStore<K: KeyValue> {
    kv: K,
}

impl<K: KeyValue> RecordingStore<K> {
    /// Wrap a key-value backend
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Access the backend
    pub fn backend(&self) -> &K {
        &self.kv
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, raw)
    }

    fn index(&self) -> Result<Vec<String>> {
        Ok(self.read(INDEX_KEY)?.unwrap_or_default())
    }

    // ==================== Recordings ====================

    /// Insert a recording, or merge it into the stored one with the same id.
    ///
    /// Returns the stored result.
    pub fn upsert(&mut self, incoming: SessionRecording) -> Result<SessionRecording> {
        let id = incoming.id.clone();
        let key = recording_key(&id);

        let merged = match self.read::<SessionRecording>(&key)? {
            Some(mut stored) => {
                let before = stored.events.len();
                merge_recording(&mut stored, incoming);
                tracing::debug!(
                    "Merged recording {}: {} -> {} events",
                    id,
                    before,
                    stored.events.len()
                );
                stored
            }
            None => {
                let mut fresh = incoming;
                let events = std::mem::take(&mut fresh.events);
                merge::merge_events(&mut fresh.events, events);
                tracing::debug!("Created recording {} with {} events", id, fresh.events.len());
                fresh
            }
        };

        self.write(&key, &merged)
            .with_context(|| format!("Failed to persist recording {}", id))?;

        let mut index = self.index()?;
        if !index.contains(&id) {
            index.push(id);
            self.write(INDEX_KEY, &index)?;
        }

        Ok(merged)
    }

    /// Get a recording, `None` if absent
    pub fn find(&self, id: &str) -> Result<Option<SessionRecording>> {
        self.read(&recording_key(id))
    }

    /// Get a recording, failing with NotFound if absent
    pub fn get(&self, id: &str) -> Result<SessionRecording> {
        self.find(id)?.ok_or_else(|| ReplayError::not_found(id))
    }

    /// All stored recordings in creation order
    pub fn list(&self) -> Result<Vec<SessionRecording>> {
        let mut recordings = Vec::new();
        for id in self.index()? {
            match self.find(&id)? {
                Some(recording) => recordings.push(recording),
                None => tracing::debug!("Index entry {} has no recording", id),
            }
        }
        Ok(recordings)
    }

    /// Summaries of all stored recordings
    pub fn list_summaries(&self) -> Result<Vec<RecordingSummary>> {
        Ok(self.list()?.iter().map(RecordingSummary::from).collect())
    }

    /// Delete a recording and its markers
    pub fn delete(&mut self, id: &str) -> Result<()> {
        if self.find(id)?.is_none() {
            return Err(ReplayError::not_found(id));
        }
        self.kv.remove(&recording_key(id))?;
        self.kv.remove(&markers_key(id))?;

        let mut index = self.index()?;
        index.retain(|entry| entry != id);
        self.write(INDEX_KEY, &index)?;

        tracing::info!("Deleted recording {}", id);
        Ok(())
    }

    /// Shallow-merge a patch into a recording's metadata
    pub fn update_metadata(&mut self, id: &str, patch: &MetadataPatch) -> Result<SessionRecording> {
        let mut recording = self.get(id)?;
        patch.apply(&mut recording.metadata);
        self.write(&recording_key(id), &recording)?;
        Ok(recording)
    }

    /// Write a recording to a JSON file
    pub fn export_to_file(&self, id: &str, path: &Path) -> Result<()> {
        self.get(id)?.save_to_file(path)
    }

    /// Read a recording from a JSON file and merge it in
    pub fn import_from_file(&mut self, path: &Path) -> Result<SessionRecording> {
        let recording = SessionRecording::load_from_file(path)
            .with_context(|| format!("Failed to import {}", path.display()))?;
        self.upsert(recording)
    }

    // ==================== Markers ====================

    /// Markers for a recording (empty if none were saved)
    pub fn markers(&self, recording_id: &str) -> Result<TimelineMarkers> {
        Ok(self
            .read(&markers_key(recording_id))?
            .unwrap_or_else(|| TimelineMarkers::new(recording_id)))
    }

    /// Persist markers for a recording
    pub fn save_markers(&mut self, markers: &TimelineMarkers) -> Result<()> {
        self.write(&markers_key(&markers.recording_id), markers)
    }

    fn with_markers<T>(
        &mut self,
        recording_id: &str,
        f: impl FnOnce(Millis, &mut TimelineMarkers) -> Result<T>,
    ) -> Result<T> {
        let duration = self.get(recording_id)?.duration;
        let mut markers = self.markers(recording_id)?;
        let result = f(duration, &mut markers)?;
        self.save_markers(&markers)?;
        Ok(result)
    }

    /// Add an annotation, validated against the stored duration
    pub fn add_annotation(
        &mut self,
        recording_id: &str,
        draft: NewAnnotation,
        now: Millis,
    ) -> Result<Annotation> {
        self.with_markers(recording_id, |duration, markers| {
            markers.add_annotation(duration, draft, now)
        })
    }

    /// Remove an annotation
    pub fn remove_annotation(&mut self, recording_id: &str, annotation_id: &str) -> Result<()> {
        self.with_markers(recording_id, |_, markers| {
            if markers.remove_annotation(annotation_id) {
                Ok(())
            } else {
                Err(ReplayError::not_found(annotation_id))
            }
        })
    }

    /// Reply to an annotation
    pub fn add_reply(
        &mut self,
        recording_id: &str,
        annotation_id: &str,
        author: Author,
        text: &str,
        now: Millis,
    ) -> Result<Reply> {
        self.with_markers(recording_id, |_, markers| {
            markers.add_reply(annotation_id, author, text, now)
        })
    }

    /// Set an annotation's resolved flag
    pub fn set_resolved(
        &mut self,
        recording_id: &str,
        annotation_id: &str,
        resolved: bool,
    ) -> Result<()> {
        self.with_markers(recording_id, |_, markers| {
            markers.set_resolved(annotation_id, resolved)
        })
    }

    /// Add a bookmark, validated against the stored duration
    pub fn add_bookmark(
        &mut self,
        recording_id: &str,
        timestamp: Millis,
        label: &str,
        color: &str,
        author: Author,
    ) -> Result<Bookmark> {
        self.with_markers(recording_id, |duration, markers| {
            markers.add_bookmark(duration, timestamp, label, color, author)
        })
    }

    /// Remove a bookmark
    pub fn remove_bookmark(&mut self, recording_id: &str, bookmark_id: &str) -> Result<()> {
        self.with_markers(recording_id, |_, markers| {
            if markers.remove_bookmark(bookmark_id) {
                Ok(())
            } else {
                Err(ReplayError::not_found(bookmark_id))
            }
        })
    }
}
