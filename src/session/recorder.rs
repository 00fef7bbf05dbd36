//! Session recorder for capturing live interaction sessions
//!
//! The recorder appends captured events to the live recording and to an
//! in-memory buffer. Every flush interval the buffer is submitted to the
//! store as an upsert; the buffered events move into an in-flight slot and
//! are dropped only once the store acknowledges them. A failed flush puts
//! them back at the front of the buffer for the next interval, so events are
//! never lost to an unavailable store. Delivery is at-least-once; the
//! store's merge absorbs duplicates.
//!
//! Each flush is tagged with the recording it belongs to. A recorder can be
//! reused for consecutive recordings: events of a cancelled or stopped
//! recording are never restored into the next one's buffer, and finalized
//! recordings queue up until the store has acknowledged each of them.

use std::collections::{HashMap, VecDeque};

use serde_json::{json, Value};

use crate::clock::SharedClock;
use crate::config::RecorderConfig;
use crate::error::{ReplayError, Result};
use crate::scheduler::IntervalTimer;
use crate::store::{PendingReply, StoreClient};
use crate::types::{Actor, EventType, Interaction, Millis, SessionEvent};

use super::source::InteractionSource;
use super::types::{Participant, RecorderState, SessionRecording};

/// Counters describing recorder activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Events appended to recordings
    pub events_recorded: u64,
    /// Notifications discarded by sampling or duplicate view transitions
    pub events_discarded: u64,
    /// Upserts submitted to the store
    pub flushes_issued: u64,
    /// Upserts the store acknowledged
    pub flushes_acknowledged: u64,
    /// Upserts that failed and will be retried
    pub flushes_failed: u64,
    /// Captures where the clock went backwards
    pub clock_regressions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushKind {
    Incremental,
    Final,
}

#[derive(Debug)]
struct InFlightFlush {
    kind: FlushKind,
    recording_id: String,
    events: Vec<SessionEvent>,
    reply: PendingReply<()>,
}

/// Session recorder for capturing interaction sessions
#[derive(Debug)]
pub struct SessionRecorder {
    config: RecorderConfig,
    clock: SharedClock,
    store: StoreClient,
    /// Current recording state
    state: RecorderState,
    /// The user who started the recording
    owner: Option<Actor>,
    /// Live recording
    recording: Option<SessionRecording>,
    /// Events captured since the last acknowledged flush
    buffer: Vec<SessionEvent>,
    in_flight: Option<InFlightFlush>,
    /// Finalized recordings not yet acknowledged by the store, oldest first
    pending_finals: VecDeque<SessionRecording>,
    final_retry_at: Millis,
    flush_timer: IntervalTimer,
    /// Last accepted capture time per sampled event type
    last_sampled: HashMap<EventType, Millis>,
    last_view: Option<String>,
    last_timestamp: Option<Millis>,
    stats: RecorderStats,
}

impl SessionRecorder {
    /// Create a new session recorder
    pub fn new(config: RecorderConfig, clock: SharedClock, store: StoreClient) -> Self {
        let flush_timer = IntervalTimer::new(config.flush_interval_ms);
        Self {
            config,
            clock,
            store,
            state: RecorderState::Idle,
            owner: None,
            recording: None,
            buffer: Vec::new(),
            in_flight: None,
            pending_finals: VecDeque::new(),
            final_retry_at: 0,
            flush_timer,
            last_sampled: HashMap::new(),
            last_view: None,
            last_timestamp: None,
            stats: RecorderStats::default(),
        }
    }

    /// Get current state
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Check if recording
    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Get the live recording
    pub fn recording(&self) -> Option<&SessionRecording> {
        self.recording.as_ref()
    }

    /// Number of events waiting for a flush
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a flush is awaiting the store's reply
    pub fn has_flush_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether every captured event has been acknowledged by the store
    pub fn is_settled(&self) -> bool {
        self.buffer.is_empty() && self.in_flight.is_none() && self.pending_finals.is_empty()
    }

    /// Number of finalized recordings awaiting the store's acknowledgement
    pub fn pending_final_count(&self) -> usize {
        self.pending_finals.len()
    }

    /// Get activity counters
    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Start a new recording owned by `actor`; returns its id
    pub fn start(&mut self, title: impl Into<String>, actor: Actor) -> Result<String> {
        if self.is_recording() {
            return Err(ReplayError::InvalidState(
                "start called while already recording".to_string(),
            ));
        }

        let now = self.clock.now_ms();
        let title = title.into();
        let mut recording = SessionRecording::new(SessionRecording::generate_id(), &title, now);
        recording.upsert_participant(Participant::joined(&actor, now));
        let id = recording.id.clone();

        self.recording = Some(recording);
        self.owner = Some(actor.clone());
        self.buffer.clear();
        self.last_sampled.clear();
        self.last_view = None;
        self.last_timestamp = None;
        self.state = RecorderState::Recording;
        self.flush_timer.start(now);

        self.append(
            &actor,
            EventType::Interaction,
            json!({ "action": "recording-started", "title": title }),
        );

        tracing::info!("Recording {} started by {}", id, actor.user_id);
        Ok(id)
    }

    /// Append an event attributed to the recording owner.
    ///
    /// No sampling is applied. Returns `None` (and does nothing) when not
    /// recording.
    pub fn record(&mut self, event_type: EventType, payload: Value) -> Option<&SessionEvent> {
        let actor = self.owner.clone()?;
        self.record_as(&actor, event_type, payload)
    }

    /// Append an event attributed to `actor`
    pub fn record_as(
        &mut self,
        actor: &Actor,
        event_type: EventType,
        payload: Value,
    ) -> Option<&SessionEvent> {
        if !self.is_recording() {
            return None;
        }
        Some(self.append(actor, event_type, payload))
    }

    /// Capture a live notification, applying the sampling policy.
    ///
    /// Pointer movements closer than `cursor_sample_ms` and scrolls closer
    /// than `scroll_sample_ms` to the previously accepted one are discarded.
    /// Clicks and generic interactions are never discarded. A view change is
    /// recorded once per distinct transition. Returns true if recorded.
    pub fn capture(&mut self, interaction: &Interaction) -> bool {
        let Some(actor) = self.owner.clone() else {
            return false;
        };
        self.capture_as(&actor, interaction)
    }

    /// Capture a live notification attributed to `actor`
    pub fn capture_as(&mut self, actor: &Actor, interaction: &Interaction) -> bool {
        if !self.is_recording() {
            return false;
        }

        let now = self.clock.now_ms();
        let event_type = interaction.event_type;
        let min_spacing = match event_type {
            EventType::Cursor => Some(self.config.cursor_sample_ms),
            EventType::Scroll => Some(self.config.scroll_sample_ms),
            _ => None,
        };

        if let Some(spacing) = min_spacing {
            if let Some(last) = self.last_sampled.get(&event_type) {
                if now.saturating_sub(*last) < spacing {
                    self.stats.events_discarded += 1;
                    return false;
                }
            }
            self.last_sampled.insert(event_type, now);
        }

        if event_type == EventType::TabChange {
            let Some(view) = interaction.view() else {
                self.stats.events_discarded += 1;
                return false;
            };
            if self.last_view.as_deref() == Some(view) {
                self.stats.events_discarded += 1;
                return false;
            }
            self.last_view = Some(view.to_string());
        }

        let payload = interaction.to_payload(actor, now);
        self.append(actor, event_type, payload);
        true
    }

    /// Capture everything a source has queued; returns how many were recorded
    pub fn pump(&mut self, source: &mut dyn InteractionSource) -> usize {
        source
            .poll_interactions()
            .iter()
            .filter(|interaction| self.capture(interaction))
            .count()
    }

    /// Add a participant to the live recording.
    ///
    /// A user re-joining after leaving replaces their previous span.
    pub fn join(&mut self, actor: &Actor) -> Result<()> {
        if !self.is_recording() {
            return Err(ReplayError::InvalidState(
                "join called while not recording".to_string(),
            ));
        }
        let now = self.clock.now_ms();
        if let Some(recording) = self.recording.as_mut() {
            recording.upsert_participant(Participant::joined(actor, now));
        }
        self.append(
            actor,
            EventType::Interaction,
            json!({ "action": "participant-joined" }),
        );
        Ok(())
    }

    /// Mark a participant as having left
    pub fn leave(&mut self, user_id: &str) -> Result<()> {
        if !self.is_recording() {
            return Err(ReplayError::InvalidState(
                "leave called while not recording".to_string(),
            ));
        }
        let now = self.clock.now_ms();
        let actor = {
            let recording = self
                .recording
                .as_mut()
                .ok_or_else(|| ReplayError::InvalidState("no live recording".to_string()))?;
            let participant = recording
                .participants
                .iter_mut()
                .find(|p| p.user_id == user_id)
                .ok_or_else(|| ReplayError::not_found(user_id))?;
            participant.left_at = Some(now);
            Actor::new(
                &participant.user_id,
                &participant.user_name,
                &participant.user_color,
            )
        };
        self.append(
            &actor,
            EventType::Interaction,
            json!({ "action": "participant-left" }),
        );
        Ok(())
    }

    /// Drive the recorder: collect flush acknowledgements, flush the live
    /// recording when the interval has elapsed and resubmit finalized
    /// recordings that are due. Call from the host's loop.
    pub fn poll(&mut self) {
        let now = self.clock.now_ms();
        self.collect_flush_reply(now);

        if let Some(recording) = self.recording.as_mut() {
            if self.state.is_recording() {
                recording.extend_duration_to(now);
            }
        }

        if self.flush_timer.poll(now) {
            if let Err(e) = self.flush() {
                tracing::warn!("Flush failed, keeping {} events: {}", self.buffer.len(), e);
            }
        }

        if self.in_flight.is_none() && !self.pending_finals.is_empty() && now >= self.final_retry_at
        {
            self.send_final(now);
        }
    }

    /// Submit the buffered events to the store now.
    ///
    /// Does nothing if the buffer is empty or a flush is already in flight.
    /// On a submit error the buffer is left untouched.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() || self.in_flight.is_some() {
            return Ok(());
        }
        let Some(recording) = self.recording.as_ref() else {
            return Ok(());
        };

        let mut snapshot = recording.clone();
        snapshot.events = self.buffer.clone();

        match self.store.upsert(snapshot) {
            Ok(reply) => {
                self.stats.flushes_issued += 1;
                tracing::debug!(
                    "Flushing {} events for {}",
                    self.buffer.len(),
                    recording.id
                );
                self.in_flight = Some(InFlightFlush {
                    kind: FlushKind::Incremental,
                    recording_id: recording.id.clone(),
                    events: std::mem::take(&mut self.buffer),
                    reply,
                });
                Ok(())
            }
            Err(e) => {
                self.stats.flushes_failed += 1;
                Err(e)
            }
        }
    }

    /// Stop recording; returns the finalized recording.
    ///
    /// Appends a final event, freezes the duration, closes the owner's
    /// participant span, cancels the flush timer and submits the complete
    /// recording. The submission keeps being retried by [`poll`](Self::poll)
    /// until the store acknowledges it; a new recording may be started in the
    /// meantime.
    pub fn stop(&mut self) -> Result<SessionRecording> {
        if !self.is_recording() {
            return Err(ReplayError::InvalidState(
                "stop called while not recording".to_string(),
            ));
        }
        let owner = self
            .owner
            .clone()
            .ok_or_else(|| ReplayError::InvalidState("recording has no owner".to_string()))?;

        self.append(
            &owner,
            EventType::Interaction,
            json!({ "action": "recording-stopped" }),
        );

        let now = self.clock.now_ms();
        let mut recording = self
            .recording
            .take()
            .ok_or_else(|| ReplayError::InvalidState("no live recording".to_string()))?;
        recording.finalize(now.max(self.last_timestamp.unwrap_or(now)));
        if let Some(participant) = recording
            .participants
            .iter_mut()
            .find(|p| p.user_id == owner.user_id)
        {
            participant.left_at = Some(now);
        }

        self.flush_timer.cancel();
        self.state = RecorderState::Idle;
        self.owner = None;
        // the final snapshot carries every event
        self.buffer.clear();
        self.pending_finals.push_back(recording.clone());
        self.final_retry_at = now;
        if self.in_flight.is_none() {
            self.send_final(now);
        }

        tracing::info!(
            "Recording {} stopped: {} events over {} ms",
            recording.id,
            recording.events.len(),
            recording.duration
        );
        Ok(recording)
    }

    /// Discard the live recording without finalizing it.
    ///
    /// An incremental flush still in flight for it is detached; finalized
    /// recordings of earlier sessions keep being submitted.
    pub fn cancel(&mut self) {
        if let Some(recording) = self.recording.take() {
            tracing::info!("Recording {} cancelled", recording.id);
            if self
                .in_flight
                .as_ref()
                .is_some_and(|f| f.kind == FlushKind::Incremental && f.recording_id == recording.id)
            {
                self.in_flight = None;
            }
        }
        self.flush_timer.cancel();
        self.buffer.clear();
        self.owner = None;
        self.state = RecorderState::Idle;
    }

    fn append(&mut self, actor: &Actor, event_type: EventType, payload: Value) -> &SessionEvent {
        let timestamp = self.capture_timestamp();
        let event = SessionEvent::new(event_type, timestamp, actor.clone(), payload);

        if let Some(recording) = self.recording.as_mut() {
            if event_type == EventType::TabChange {
                if let Some(view) = event.payload.get("view").and_then(Value::as_str) {
                    recording.metadata.add_view(view);
                }
            }
            recording.extend_duration_to(timestamp);
            recording.events.push(event.clone());
        }
        self.buffer.push(event);
        self.stats.events_recorded += 1;

        if self.config.max_buffered_events > 0 && self.buffer.len() >= self.config.max_buffered_events
        {
            self.flush_timer.fire_next_poll(timestamp);
        }

        &self.buffer[self.buffer.len() - 1]
    }

    /// Capture time from the clock, never earlier than the previous capture
    fn capture_timestamp(&mut self) -> Millis {
        let now = self.clock.now_ms();
        let timestamp = match self.last_timestamp {
            Some(last) if now < last => {
                self.stats.clock_regressions += 1;
                tracing::warn!("Clock went backwards by {} ms; clamping capture time", last - now);
                last
            }
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    fn send_final(&mut self, now: Millis) {
        let Some(recording) = self.pending_finals.front().cloned() else {
            return;
        };
        let recording_id = recording.id.clone();
        match self.store.upsert(recording) {
            Ok(reply) => {
                self.stats.flushes_issued += 1;
                self.in_flight = Some(InFlightFlush {
                    kind: FlushKind::Final,
                    recording_id,
                    events: Vec::new(),
                    reply,
                });
            }
            Err(e) => {
                self.stats.flushes_failed += 1;
                self.final_retry_at = now.saturating_add(self.config.flush_interval_ms);
                tracing::warn!("Final flush could not be submitted: {}", e);
            }
        }
    }

    fn collect_flush_reply(&mut self, now: Millis) {
        let Some(result) = self.in_flight.as_ref().and_then(|f| f.reply.try_take()) else {
            return;
        };
        let Some(flush) = self.in_flight.take() else {
            return;
        };

        match (result, flush.kind) {
            (Ok(()), FlushKind::Incremental) => {
                self.stats.flushes_acknowledged += 1;
            }
            (Ok(()), FlushKind::Final) => {
                self.stats.flushes_acknowledged += 1;
                self.pending_finals.retain(|r| r.id != flush.recording_id);
                tracing::debug!("Recording {} persisted", flush.recording_id);
                // next queued snapshot goes out without waiting
                self.final_retry_at = now;
            }
            (Err(e), FlushKind::Incremental) => {
                self.stats.flushes_failed += 1;
                let live = self.recording.as_ref().map(|r| r.id.as_str());
                if live != Some(flush.recording_id.as_str()) {
                    // stopped (the final snapshot carries these) or cancelled
                    tracing::debug!(
                        "Dropping failed flush for {}, no longer live: {}",
                        flush.recording_id,
                        e
                    );
                } else {
                    tracing::warn!("Flush of {} events failed, retrying: {}", flush.events.len(), e);
                    let mut events = flush.events;
                    events.append(&mut self.buffer);
                    self.buffer = events;
                }
            }
            (Err(e), FlushKind::Final) => {
                self.stats.flushes_failed += 1;
                self.final_retry_at = now.saturating_add(self.config.flush_interval_ms);
                tracing::warn!("Final flush failed, retrying: {}", e);
            }
        }
    }
}
