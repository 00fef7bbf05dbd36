//! Session player for playing back recorded sessions
//!
//! Playback position is derived from the clock rather than accumulated per
//! tick: `current_time = (now - start_ref) * speed`. Every transition that
//! changes the time base goes through [`rebase`], so play, resume, seek and
//! speed changes never make the position jump.
//!
//! Events are delivered through a dispatch cursor. Each tick hands the
//! consumer every event between the cursor and the newly crossed index, in
//! order, then advances the cursor; an event is never delivered twice within
//! a pass. A seek moves the cursor to the seek target without delivering the
//! skipped events. Consumers that need the full state at the new position
//! read [`SessionPlayer::current_events`].
//!
//! A backward seek starts a new pass: the cursor moves back with the
//! position, so events after the target that were already delivered are
//! delivered again when playback crosses them. Consumers that apply events
//! as state changes should rebuild from `current_events` after a seek.

use crate::clock::SharedClock;
use crate::config::PlayerConfig;
use crate::error::{ReplayError, Result};
use crate::scheduler::IntervalTimer;
use crate::store::{PendingReply, StoreClient};
use crate::types::{Millis, SessionEvent};

use super::types::{PlaybackState, PlayerState, SessionRecording};

/// Receives events as playback crosses them
pub trait PlaybackConsumer {
    fn on_event_play(&mut self, event: &SessionEvent);
}

impl<F> PlaybackConsumer for F
where
    F: FnMut(&SessionEvent),
{
    fn on_event_play(&mut self, event: &SessionEvent) {
        self(event)
    }
}

/// Time base for playback: the instant at which `current_time` would have
/// been zero at the given speed
pub fn rebase(now: Millis, current_time: f64, speed: f64) -> f64 {
    now as f64 - current_time / speed
}

/// Session player for playing back recorded sessions
pub struct SessionPlayer {
    config: PlayerConfig,
    clock: SharedClock,
    state: PlayerState,
    recording: Option<SessionRecording>,
    /// Milliseconds relative to the recording start
    current_time: f64,
    playback_speed: f64,
    /// Last event at or before `current_time`
    current_event_index: Option<usize>,
    /// Index of the next event to deliver
    next_dispatch: usize,
    start_ref: f64,
    tick_timer: IntervalTimer,
    loop_playback: bool,
    consumer: Option<Box<dyn PlaybackConsumer>>,
    pending_load: Option<PendingReply<SessionRecording>>,
}

impl std::fmt::Debug for SessionPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPlayer")
            .field("state", &self.state)
            .field("recording", &self.recording.as_ref().map(|r| &r.id))
            .field("current_time", &self.current_time)
            .field("playback_speed", &self.playback_speed)
            .field("current_event_index", &self.current_event_index)
            .field("next_dispatch", &self.next_dispatch)
            .finish()
    }
}

impl SessionPlayer {
    /// Create a new session player
    pub fn new(config: PlayerConfig, clock: SharedClock) -> Self {
        let tick_timer = IntervalTimer::new(config.tick_interval_ms);
        let playback_speed = config.default_speed.clamp(config.min_speed, config.max_speed);
        let loop_playback = config.loop_playback;
        Self {
            config,
            clock,
            state: PlayerState::Stopped,
            recording: None,
            current_time: 0.0,
            playback_speed,
            current_event_index: None,
            next_dispatch: 0,
            start_ref: 0.0,
            tick_timer,
            loop_playback,
            consumer: None,
            pending_load: None,
        }
    }

    /// Register the consumer that receives dispatched events
    pub fn set_consumer(&mut self, consumer: impl PlaybackConsumer + 'static) {
        self.consumer = Some(Box::new(consumer));
    }

    /// Remove the registered consumer
    pub fn clear_consumer(&mut self) {
        self.consumer = None;
    }

    /// Get current state
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Check if playing
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Check if paused
    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Check if a recording is loaded
    pub fn has_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Get the loaded recording
    pub fn recording(&self) -> Option<&SessionRecording> {
        self.recording.as_ref()
    }

    /// Current position in milliseconds relative to the recording start
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Index of the last event at or before the current position
    pub fn current_event_index(&self) -> Option<usize> {
        self.current_event_index
    }

    /// Get playback speed
    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    /// Get whether loop playback is enabled
    pub fn loop_playback(&self) -> bool {
        self.loop_playback
    }

    /// Set loop playback
    pub fn set_loop_playback(&mut self, loop_enabled: bool) {
        self.loop_playback = loop_enabled;
    }

    /// Duration of the loaded recording
    pub fn total_duration(&self) -> Millis {
        self.recording.as_ref().map_or(0, |r| r.duration)
    }

    /// Playback progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        let total = self.total_duration();
        if total == 0 {
            return 0.0;
        }
        self.current_time / total as f64
    }

    /// Snapshot of the transient playback state
    pub fn playback_state(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.is_playing(),
            is_paused: self.is_paused(),
            current_time: self.current_time,
            playback_speed: self.playback_speed,
            current_event_index: self.current_event_index,
        }
    }

    /// Every event at or before the current position, in order.
    ///
    /// The iterator is lazy and can be cloned to restart it.
    pub fn current_events(&self) -> impl Iterator<Item = &SessionEvent> + Clone + '_ {
        let (events, start_time) = match &self.recording {
            Some(recording) => (recording.events.as_slice(), recording.start_time),
            None => (&[][..], 0),
        };
        let current_time = self.current_time;
        events
            .iter()
            .take_while(move |e| e.relative_to(start_time) as f64 <= current_time)
    }

    /// Load a recording for playback, resetting the position
    pub fn load(&mut self, mut recording: SessionRecording) {
        if !recording.is_ordered() {
            tracing::warn!("Recording {} has unordered events; sorting", recording.id);
            recording.events.sort_by_key(|e| e.timestamp);
        }
        tracing::debug!(
            "Loaded recording {} ({} events, {} ms)",
            recording.id,
            recording.events.len(),
            recording.duration
        );
        self.tick_timer.cancel();
        self.recording = Some(recording);
        self.state = PlayerState::Stopped;
        self.reset_position();
    }

    /// Replace the loaded recording with a newer snapshot of it.
    ///
    /// A growing recording keeps its playback position and state; a
    /// different recording is loaded from the start.
    pub fn refresh(&mut self, mut recording: SessionRecording) {
        let same = self
            .recording
            .as_ref()
            .is_some_and(|current| current.id == recording.id);
        if !same {
            self.load(recording);
            return;
        }

        if !recording.is_ordered() {
            recording.events.sort_by_key(|e| e.timestamp);
        }
        let current_time = self.current_time.min(recording.duration as f64);
        self.current_event_index = recording.event_index_at(current_time);
        self.next_dispatch = self.current_event_index.map_or(0, |i| i + 1);
        self.current_time = current_time;
        self.recording = Some(recording);
        if self.is_playing() {
            self.start_ref = rebase(self.clock.now_ms(), current_time, self.playback_speed);
        }
    }

    /// Unload the current recording
    pub fn unload(&mut self) {
        self.tick_timer.cancel();
        self.recording = None;
        self.pending_load = None;
        self.state = PlayerState::Stopped;
        self.reset_position();
    }

    /// Ask the store for a recording; it is loaded by a later [`poll`](Self::poll)
    pub fn request_load(&mut self, store: &StoreClient, id: impl Into<String>) -> Result<()> {
        self.pending_load = Some(store.get(id)?);
        Ok(())
    }

    /// Whether a store load is outstanding
    pub fn has_pending_load(&self) -> bool {
        self.pending_load.is_some()
    }

    /// Start or resume playback
    pub fn play(&mut self) -> Result<()> {
        if self.recording.is_none() {
            return Err(ReplayError::InvalidState(
                "play called with no recording loaded".to_string(),
            ));
        }
        if self.is_playing() {
            return Ok(());
        }

        let now = self.clock.now_ms();
        self.start_ref = rebase(now, self.current_time, self.playback_speed);
        self.tick_timer.start(now);
        self.state = PlayerState::Playing;
        tracing::debug!("Playback started at {:.0} ms", self.current_time);
        Ok(())
    }

    /// Pause playback, keeping the position
    pub fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.tick_timer.cancel();
            self.state = PlayerState::Paused;
        }
    }

    /// Toggle between playing and paused
    pub fn toggle(&mut self) -> Result<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Stop playback and reset to beginning
    pub fn stop(&mut self) {
        self.tick_timer.cancel();
        self.state = PlayerState::Stopped;
        self.reset_position();
    }

    /// Move to `time` milliseconds, clamped into `[0, duration]`
    pub fn seek(&mut self, time: f64) {
        let Some(recording) = self.recording.as_ref() else {
            return;
        };

        let duration = recording.duration as f64;
        let time = if time.is_nan() { 0.0 } else { time.clamp(0.0, duration) };

        self.current_time = time;
        self.current_event_index = recording.event_index_at(time);
        self.next_dispatch = self.current_event_index.map_or(0, |i| i + 1);

        if self.is_playing() {
            self.start_ref = rebase(self.clock.now_ms(), time, self.playback_speed);
        }
    }

    /// Seek by progress (0.0 to 1.0)
    pub fn seek_progress(&mut self, progress: f64) {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        self.seek(self.total_duration() as f64 * progress);
    }

    /// Set playback speed, clamped to the configured range.
    ///
    /// Non-positive speeds are rejected.
    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ReplayError::Validation(format!(
                "Playback speed must be positive, got {}",
                speed
            )));
        }
        let speed = speed.clamp(self.config.min_speed, self.config.max_speed);
        if self.is_playing() {
            self.start_ref = rebase(self.clock.now_ms(), self.current_time, speed);
        }
        self.playback_speed = speed;
        Ok(())
    }

    /// Step forward by one event
    pub fn step_forward(&mut self) {
        let next = self.current_event_index.map_or(0, |i| i + 1);
        if self.recording.as_ref().is_some_and(|r| next < r.events.len()) {
            self.jump_to_event(next);
        }
    }

    /// Step backward by one event
    pub fn step_backward(&mut self) {
        if let Some(i) = self.current_event_index {
            if i > 0 {
                self.jump_to_event(i - 1);
            }
        }
    }

    /// Drive playback: collect store loads and tick when due.
    ///
    /// Returns the number of events dispatched. A failed store load is
    /// reported here.
    pub fn poll(&mut self) -> Result<usize> {
        if let Some(result) = self.pending_load.as_ref().and_then(|p| p.try_take()) {
            self.pending_load = None;
            self.refresh(result?);
        }

        let now = self.clock.now_ms();
        if self.tick_timer.poll(now) {
            Ok(self.tick_at(now))
        } else {
            Ok(0)
        }
    }

    /// Run one tick at the clock's current time, regardless of the timer
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.tick_at(now)
    }

    fn tick_at(&mut self, now: Millis) -> usize {
        if !self.is_playing() {
            return 0;
        }
        let Some(recording) = self.recording.as_ref() else {
            return 0;
        };

        let duration = recording.duration as f64;
        let elapsed = ((now as f64 - self.start_ref) * self.playback_speed).max(0.0);
        let reached_end = elapsed >= duration;

        self.current_time = elapsed.min(duration);
        self.current_event_index = recording.event_index_at(self.current_time);

        let dispatch_until = if reached_end {
            recording.events.len()
        } else {
            self.current_event_index.map_or(0, |i| i + 1)
        };
        let dispatched = self.dispatch_until(dispatch_until);

        if reached_end {
            if self.loop_playback {
                tracing::debug!("Playback reached end; looping");
                self.reset_position();
                self.start_ref = rebase(now, 0.0, self.playback_speed);
            } else {
                tracing::debug!("Playback reached end");
                self.stop();
            }
        }

        dispatched
    }

    /// Deliver events in `[next_dispatch, end)` to the consumer
    fn dispatch_until(&mut self, end: usize) -> usize {
        let Some(recording) = self.recording.as_ref() else {
            return 0;
        };
        let end = end.min(recording.events.len());
        if end <= self.next_dispatch {
            return 0;
        }

        if let Some(consumer) = self.consumer.as_mut() {
            for event in &recording.events[self.next_dispatch..end] {
                consumer.on_event_play(event);
            }
        }
        let count = end - self.next_dispatch;
        self.next_dispatch = end;
        count
    }

    fn jump_to_event(&mut self, index: usize) {
        let Some(recording) = self.recording.as_ref() else {
            return;
        };
        let Some(event) = recording.events.get(index) else {
            return;
        };

        let time = (recording.relative_timestamp(event) as f64).min(recording.duration as f64);
        self.current_time = time;
        self.current_event_index = Some(index);
        self.next_dispatch = index + 1;
        if self.is_playing() {
            self.start_ref = rebase(self.clock.now_ms(), time, self.playback_speed);
        }
    }

    fn reset_position(&mut self) {
        self.current_time = 0.0;
        self.current_event_index = None;
        self.next_dispatch = 0;
        self.start_ref = 0.0;
    }
}
