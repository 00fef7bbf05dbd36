//! Core event types for the session replay engine
//!
//! This module contains the immutable record types shared by the recorder and
//! the player.
//!
//! # Main Types
//!
//! - [`EventType`] - Kind of captured interaction (cursor, click, scroll, ...)
//! - [`Actor`] - The user an event is attributed to
//! - [`SessionEvent`] - One immutable, timestamped interaction record
//! - [`Interaction`] - A raw notification from a live interaction source
//! - [`CursorPosition`] - Coordinate shape shared with the live presence system
//!
//! # Ordering
//!
//! Within one recording, events are stored in non-decreasing `timestamp`
//! order. Ties keep their arrival order and are never re-sorted by a
//! secondary key.
//!
//! # Serialization
//!
//! Field names are camelCase and event types are kebab-case
//! (`"tab-change"`), so a recording round-trips through JSON with the same
//! field set regardless of which process wrote it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Milliseconds. Absolute values are Unix epoch milliseconds; relative values
/// are offsets from a recording's `start_time`.
pub type Millis = u64;

/// Kind of captured interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// Pointer movement
    Cursor,
    /// Pointer click
    Click,
    /// Scroll position change
    Scroll,
    /// Generic interaction (including recording start/stop markers)
    Interaction,
    /// Transition between named views/tabs
    TabChange,
}

impl EventType {
    /// Display name for the event type
    pub fn display_name(&self) -> &'static str {
        match self {
            EventType::Cursor => "Cursor",
            EventType::Click => "Click",
            EventType::Scroll => "Scroll",
            EventType::Interaction => "Interaction",
            EventType::TabChange => "Tab Change",
        }
    }

    /// Wire name, as used in serialized recordings
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Cursor => "cursor",
            EventType::Click => "click",
            EventType::Scroll => "scroll",
            EventType::Interaction => "interaction",
            EventType::TabChange => "tab-change",
        }
    }

    /// Get all event types
    pub fn all() -> &'static [EventType] {
        &[
            EventType::Cursor,
            EventType::Click,
            EventType::Scroll,
            EventType::Interaction,
            EventType::TabChange,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user an event or recording is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
}

impl Actor {
    /// Create a new actor
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        user_color: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            user_color: user_color.into(),
        }
    }
}

/// One immutable, timestamped interaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Unique event id; the store deduplicates on this
    pub id: String,
    /// Kind of interaction
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Absolute capture time (epoch milliseconds)
    pub timestamp: Millis,
    /// Who produced the event
    #[serde(flatten)]
    pub actor: Actor,
    /// Type-specific data, opaque to the engine
    #[serde(default)]
    pub payload: Value,
}

impl SessionEvent {
    /// Create a new event with a freshly generated id
    pub fn new(event_type: EventType, timestamp: Millis, actor: Actor, payload: Value) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            event_type,
            timestamp,
            actor,
            payload,
        }
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Timestamp relative to a recording start, saturating at zero
    pub fn relative_to(&self, start_time: Millis) -> Millis {
        self.timestamp.saturating_sub(start_time)
    }
}

/// Coordinate shape shared with the live cursor/presence broadcast.
///
/// Cursor events carry this as their payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
    pub x: f64,
    pub y: f64,
    pub timestamp: Millis,
}

impl CursorPosition {
    /// Build a cursor position for an actor
    pub fn new(actor: &Actor, x: f64, y: f64, timestamp: Millis) -> Self {
        Self {
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            user_color: actor.user_color.clone(),
            x,
            y,
            timestamp,
        }
    }
}

/// A notification delivered by a live interaction source.
///
/// The engine does not care which device produced it; the capture time is
/// assigned by the recorder when the notification is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_y: Option<f64>,
    /// Describes the target element, or the view name for tab changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_descriptor: Option<String>,
}

impl Interaction {
    fn bare(event_type: EventType) -> Self {
        Self {
            event_type,
            x: None,
            y: None,
            scroll_x: None,
            scroll_y: None,
            target_descriptor: None,
        }
    }

    /// Pointer movement to (x, y)
    pub fn pointer_move(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::bare(EventType::Cursor)
        }
    }

    /// Click at (x, y) on an optional target
    pub fn click(x: f64, y: f64, target: Option<&str>) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            target_descriptor: target.map(str::to_string),
            ..Self::bare(EventType::Click)
        }
    }

    /// Scroll to (scroll_x, scroll_y)
    pub fn scroll(scroll_x: f64, scroll_y: f64) -> Self {
        Self {
            scroll_x: Some(scroll_x),
            scroll_y: Some(scroll_y),
            ..Self::bare(EventType::Scroll)
        }
    }

    /// Transition to a named view
    pub fn view_change(view: impl Into<String>) -> Self {
        Self {
            target_descriptor: Some(view.into()),
            ..Self::bare(EventType::TabChange)
        }
    }

    /// Generic interaction with a description
    pub fn interaction(description: impl Into<String>) -> Self {
        Self {
            target_descriptor: Some(description.into()),
            ..Self::bare(EventType::Interaction)
        }
    }

    /// View name carried by a tab-change notification
    pub fn view(&self) -> Option<&str> {
        match self.event_type {
            EventType::TabChange => self.target_descriptor.as_deref(),
            _ => None,
        }
    }

    /// Convert to the payload stored on the captured event
    pub fn to_payload(&self, actor: &Actor, timestamp: Millis) -> Value {
        match self.event_type {
            EventType::Cursor => {
                let position = CursorPosition::new(
                    actor,
                    self.x.unwrap_or_default(),
                    self.y.unwrap_or_default(),
                    timestamp,
                );
                serde_json::to_value(position).unwrap_or(Value::Null)
            }
            EventType::Click => json!({
                "x": self.x,
                "y": self.y,
                "target": self.target_descriptor,
            }),
            EventType::Scroll => json!({
                "scrollX": self.scroll_x,
                "scrollY": self.scroll_y,
            }),
            EventType::TabChange => json!({ "view": self.target_descriptor }),
            EventType::Interaction => json!({ "description": self.target_descriptor }),
        }
    }
}
