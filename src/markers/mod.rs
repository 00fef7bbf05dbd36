//! Annotation/Bookmark system for recording timelines
//!
//! Markers are anchored to relative timestamps on a recording and share the
//! player's time axis. They are authored independently of the recorder and
//! the player: a marker can be added to a recording that is still being
//! captured or one that finished long ago, as long as its timestamp lies in
//! `[0, duration]` at the time of the call.
//!
//! # Features
//!
//! - Categorized annotations with threaded replies and a resolved flag
//! - Lightweight colored bookmarks
//! - Timeline positions as a percentage of the recording duration
//! - Jump-to-marker navigation

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};
use crate::types::Millis;

/// Annotation category for filtering and color coding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationCategory {
    /// Must-see moment (red)
    Important,
    /// Open question (blue)
    Question,
    /// Problem observed (orange)
    Issue,
    /// Noteworthy moment (gold)
    Highlight,
    /// Plain note (gray)
    #[default]
    Note,
}

impl AnnotationCategory {
    /// Get the default color for this category
    pub fn color(&self) -> &'static str {
        match self {
            AnnotationCategory::Important => "#ef4444",
            AnnotationCategory::Question => "#3b82f6",
            AnnotationCategory::Issue => "#f97316",
            AnnotationCategory::Highlight => "#eab308",
            AnnotationCategory::Note => "#6b7280",
        }
    }

    /// Get the display name for this category
    pub fn display_name(&self) -> &'static str {
        match self {
            AnnotationCategory::Important => "Important",
            AnnotationCategory::Question => "Question",
            AnnotationCategory::Issue => "Issue",
            AnnotationCategory::Highlight => "Highlight",
            AnnotationCategory::Note => "Note",
        }
    }

    /// Get all categories
    pub fn all() -> &'static [AnnotationCategory] {
        &[
            AnnotationCategory::Important,
            AnnotationCategory::Question,
            AnnotationCategory::Issue,
            AnnotationCategory::Highlight,
            AnnotationCategory::Note,
        ]
    }
}

impl std::str::FromStr for AnnotationCategory {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self> {
        AnnotationCategory::all()
            .iter()
            .copied()
            .find(|c| c.display_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ReplayError::Validation(format!("Unknown category: {}", s)))
    }
}

/// Author of a marker or reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub user_name: String,
    pub user_color: String,
}

impl Author {
    pub fn new(user_name: impl Into<String>, user_color: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            user_color: user_color.into(),
        }
    }
}

/// A threaded reply on an annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub author: Author,
    pub text: String,
    pub created_at: Millis,
}

/// An annotation at a relative timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    /// Relative to the recording start
    pub timestamp: Millis,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: AnnotationCategory,
    #[serde(default)]
    pub resolved: bool,
    pub author: Author,
    #[serde(default)]
    pub replies: Vec<Reply>,
    pub created_at: Millis,
}

/// Fields supplied when creating an annotation
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub timestamp: Millis,
    pub title: String,
    pub description: Option<String>,
    pub category: AnnotationCategory,
    pub author: Author,
}

impl NewAnnotation {
    /// Create a note-category annotation draft
    pub fn new(timestamp: Millis, title: impl Into<String>, author: Author) -> Self {
        Self {
            timestamp,
            title: title.into(),
            description: None,
            category: AnnotationCategory::default(),
            author,
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set category
    pub fn with_category(mut self, category: AnnotationCategory) -> Self {
        self.category = category;
        self
    }
}

/// A bookmark at a relative timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub timestamp: Millis,
    pub label: String,
    pub color: String,
    pub author: Author,
}

/// Position of `timestamp` on a 0-100% timeline axis
pub fn position_percent(timestamp: Millis, duration: Millis) -> f64 {
    if duration == 0 {
        return 0.0;
    }
    (timestamp as f64 / duration as f64 * 100.0).clamp(0.0, 100.0)
}

fn validate_timestamp(timestamp: Millis, duration: Millis) -> Result<()> {
    if timestamp > duration {
        return Err(ReplayError::Validation(format!(
            "Marker timestamp {} outside [0, {}]",
            timestamp, duration
        )));
    }
    Ok(())
}

fn marker_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Annotations and bookmarks for one recording, each sorted by timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMarkers {
    pub recording_id: String,
    #[serde(default)]
    annotations: Vec<Annotation>,
    #[serde(default)]
    bookmarks: Vec<Bookmark>,
}

impl TimelineMarkers {
    /// Create an empty marker set for a recording
    pub fn new(recording_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            annotations: Vec::new(),
            bookmarks: Vec::new(),
        }
    }

    // ==================== Annotations ====================

    /// Add an annotation; fails if its timestamp is outside `[0, duration]`
    pub fn add_annotation(
        &mut self,
        duration: Millis,
        draft: NewAnnotation,
        now: Millis,
    ) -> Result<Annotation> {
        validate_timestamp(draft.timestamp, duration)?;
        if draft.title.trim().is_empty() {
            return Err(ReplayError::Validation(
                "Annotation title must not be empty".to_string(),
            ));
        }

        let annotation = Annotation {
            id: marker_id("ann"),
            timestamp: draft.timestamp,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            resolved: false,
            author: draft.author,
            replies: Vec::new(),
            created_at: now,
        };
        self.annotations.push(annotation.clone());
        self.annotations.sort_by_key(|a| a.timestamp);
        Ok(annotation)
    }

    /// Remove an annotation by ID
    pub fn remove_annotation(&mut self, id: &str) -> bool {
        if let Some(pos) = self.annotations.iter().position(|a| a.id == id) {
            self.annotations.remove(pos);
            true
        } else {
            false
        }
    }

    /// Get an annotation by ID
    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn annotation_mut(&mut self, id: &str) -> Result<&mut Annotation> {
        self.annotations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ReplayError::not_found(id))
    }

    /// Append a reply to an annotation's thread
    pub fn add_reply(
        &mut self,
        annotation_id: &str,
        author: Author,
        text: impl Into<String>,
        now: Millis,
    ) -> Result<Reply> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ReplayError::Validation(
                "Reply text must not be empty".to_string(),
            ));
        }
        let reply = Reply {
            id: marker_id("rpl"),
            author,
            text,
            created_at: now,
        };
        self.annotation_mut(annotation_id)?.replies.push(reply.clone());
        Ok(reply)
    }

    /// Set the resolved flag
    pub fn set_resolved(&mut self, annotation_id: &str, resolved: bool) -> Result<()> {
        self.annotation_mut(annotation_id)?.resolved = resolved;
        Ok(())
    }

    /// Flip the resolved flag, returning the new value
    pub fn toggle_resolved(&mut self, annotation_id: &str) -> Result<bool> {
        let annotation = self.annotation_mut(annotation_id)?;
        annotation.resolved = !annotation.resolved;
        Ok(annotation.resolved)
    }

    /// All annotations, sorted by timestamp
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations of one category
    pub fn by_category(
        &self,
        category: AnnotationCategory,
    ) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .filter(move |a| a.category == category)
    }

    /// Annotations not yet resolved
    pub fn unresolved(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(|a| !a.resolved)
    }

    /// Annotations within `[start, end]`
    pub fn annotations_in_range(
        &self,
        start: Millis,
        end: Millis,
    ) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .filter(move |a| a.timestamp >= start && a.timestamp <= end)
    }

    // ==================== Bookmarks ====================

    /// Add a bookmark; fails if its timestamp is outside `[0, duration]`
    pub fn add_bookmark(
        &mut self,
        duration: Millis,
        timestamp: Millis,
        label: impl Into<String>,
        color: impl Into<String>,
        author: Author,
    ) -> Result<Bookmark> {
        validate_timestamp(timestamp, duration)?;
        let bookmark = Bookmark {
            id: marker_id("bmk"),
            timestamp,
            label: label.into(),
            color: color.into(),
            author,
        };
        self.bookmarks.push(bookmark.clone());
        self.bookmarks.sort_by_key(|b| b.timestamp);
        Ok(bookmark)
    }

    /// Remove a bookmark by ID
    pub fn remove_bookmark(&mut self, id: &str) -> bool {
        if let Some(pos) = self.bookmarks.iter().position(|b| b.id == id) {
            self.bookmarks.remove(pos);
            true
        } else {
            false
        }
    }

    /// All bookmarks, sorted by timestamp
    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    // ==================== Navigation ====================

    fn timestamps(&self) -> impl Iterator<Item = Millis> + '_ {
        self.annotations
            .iter()
            .map(|a| a.timestamp)
            .chain(self.bookmarks.iter().map(|b| b.timestamp))
    }

    /// Earliest marker strictly after `time`
    pub fn next_after(&self, time: Millis) -> Option<Millis> {
        self.timestamps().filter(|&t| t > time).min()
    }

    /// Latest marker strictly before `time`
    pub fn prev_before(&self, time: Millis) -> Option<Millis> {
        self.timestamps().filter(|&t| t < time).max()
    }

    /// Marker closest to `time`
    pub fn nearest(&self, time: Millis) -> Option<Millis> {
        self.timestamps().min_by_key(|&t| t.abs_diff(time))
    }

    /// Get count of markers
    pub fn len(&self) -> usize {
        self.annotations.len() + self.bookmarks.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.bookmarks.is_empty()
    }
}
