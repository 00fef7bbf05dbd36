//! Cooperative interval timers
//!
//! The engine runs on a single execution context: nothing here spawns threads
//! or sleeps. A component owns one [`IntervalTimer`] and polls it with the
//! current time from its own update method (the recorder for flushes, the
//! player for ticks). Polling an inactive or cancelled timer never fires.
//!
//! Starting a timer hands out a [`TimerHandle`] that can cancel it from
//! elsewhere, e.g. a host shutting down a session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::Millis;

/// Cancellation handle for a started timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the timer this handle belongs to
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A repeating timer polled by its owner
#[derive(Debug)]
pub struct IntervalTimer {
    interval_ms: Millis,
    next_due: Option<Millis>,
    handle: Option<TimerHandle>,
}

impl IntervalTimer {
    /// Create an inactive timer with the given period
    pub fn new(interval_ms: Millis) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            next_due: None,
            handle: None,
        }
    }

    /// Timer period
    pub fn interval_ms(&self) -> Millis {
        self.interval_ms
    }

    /// Start (or restart) the timer; the first firing is one period from `now`
    pub fn start(&mut self, now: Millis) -> TimerHandle {
        if let Some(old) = self.handle.take() {
            old.cancel();
        }
        let handle = TimerHandle::new();
        self.handle = Some(handle.clone());
        self.next_due = Some(now.saturating_add(self.interval_ms));
        handle
    }

    /// Cancel the timer
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
        self.next_due = None;
    }

    /// Check if the timer is running
    pub fn is_active(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_cancelled(),
            None => false,
        }
    }

    /// Time of the next firing, if active
    pub fn next_due(&self) -> Option<Millis> {
        if self.is_active() {
            self.next_due
        } else {
            None
        }
    }

    /// Returns true if the timer fired since the last poll.
    ///
    /// Missed periods coalesce into a single firing; the next deadline stays
    /// aligned to the original schedule.
    pub fn poll(&mut self, now: Millis) -> bool {
        if !self.is_active() {
            self.next_due = None;
            return false;
        }
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }
        let missed = (now - due) / self.interval_ms;
        self.next_due = Some(due + (missed + 1) * self.interval_ms);
        true
    }

    /// Fire on the next poll regardless of the schedule
    pub fn fire_next_poll(&mut self, now: Millis) {
        if self.is_active() {
            self.next_due = Some(now);
        }
    }
}
