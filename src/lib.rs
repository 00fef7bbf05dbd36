//! # Session Replay: interaction recording and playback engine
//!
//! Captures a time-ordered log of user-interaction events during a live
//! session, persists it incrementally, and later plays it back with seek,
//! pause and variable speed. Recordings carry annotations and bookmarks on
//! the same timeline.
//!
//! ## Architecture
//!
//! - **Session**: [`SessionRecorder`] captures and flushes, [`SessionPlayer`]
//!   replays against a [`Clock`]
//! - **Store**: [`RecordingStore`] merges upserts over a key-value backend;
//!   [`StoreWorker`] runs it behind crossbeam channels so callers never block
//! - **Markers**: [`TimelineMarkers`] holds annotations and bookmarks per
//!   recording
//! - **Scheduling**: components own an [`IntervalTimer`] and are polled from
//!   the host's loop
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform config directory under
//! `dev.hxyulin.session-replay`, and recordings live in the platform data
//! directory unless `store.data_dir` is set.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use session_replay::{
//!     Actor, Interaction, MemoryKv, RecordingStore, ReplayConfig, SessionRecorder,
//!     StoreWorker, SystemClock,
//! };
//!
//! let config = ReplayConfig::load_or_default();
//! let (mut worker, client) = StoreWorker::new(RecordingStore::new(MemoryKv::new()));
//! let mut recorder = SessionRecorder::new(config.recorder, Arc::new(SystemClock), client);
//!
//! recorder.start("Demo", Actor::new("u1", "Ada", "#ff0066"))?;
//! recorder.capture(&Interaction::click(10.0, 20.0, Some("button#save")));
//! recorder.stop()?;
//!
//! worker.process_pending();
//! recorder.poll();
//! # Ok::<(), session_replay::ReplayError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod markers;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::ReplayConfig;
pub use error::{ReplayError, Result, ResultExt};
pub use markers::{Annotation, AnnotationCategory, Author, Bookmark, NewAnnotation, TimelineMarkers};
pub use scheduler::{IntervalTimer, TimerHandle};
pub use session::{
    PlaybackConsumer, PlaybackState, PlayerState, RecorderState, SessionPlayer, SessionRecorder,
    SessionRecording,
};
pub use store::{FileKv, KeyValue, MemoryKv, RecordingStore, StoreClient, StoreWorker};
pub use types::{Actor, EventType, Interaction, Millis, SessionEvent};
