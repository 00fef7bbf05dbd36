//! Session recording and playback module
//!
//! The recorder captures live interactions into a [`SessionRecording`] and
//! flushes it incrementally to the store. The player reconstructs playback
//! of a finished or still-growing recording against a clock.
//!
//! # Features
//!
//! - Sampled capture of pointer, scroll, click and view-change interactions
//! - Periodic at-least-once flushing with retained buffers on store failure
//! - Play back sessions at original or variable speed
//! - Seek to specific times or step event by event
//! - Exactly-once event dispatch to a registered consumer

pub mod player;
pub mod recorder;
pub mod source;
pub mod types;

pub use player::{PlaybackConsumer, SessionPlayer};
pub use recorder::{RecorderStats, SessionRecorder};
pub use source::{ChannelSource, InteractionSource};
pub use types::{
    MetadataPatch, Participant, PlaybackState, PlayerState, RecorderState, RecordingMetadata,
    SessionRecording,
};
