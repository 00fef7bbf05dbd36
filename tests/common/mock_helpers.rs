//! Fault injection and setup helpers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use session_replay::{
    config::{PlayerConfig, RecorderConfig},
    store::StoreWorker,
    KeyValue, ManualClock, MemoryKv, Millis, RecordingStore, ReplayError, Result,
    SessionPlayer, SessionRecorder,
};

/// Switch controlling a [`FlakyKv`] from the test body
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    failing: Arc<AtomicBool>,
    rejected_writes: Arc<AtomicUsize>,
}

impl FaultSwitch {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    pub fn rejected_writes(&self) -> usize {
        self.rejected_writes.load(Ordering::SeqCst)
    }
}

/// Memory backend whose writes fail while the switch is on
#[derive(Debug, Clone)]
pub struct FlakyKv {
    inner: MemoryKv,
    switch: FaultSwitch,
}

impl FlakyKv {
    pub fn new() -> (Self, FaultSwitch) {
        let switch = FaultSwitch::default();
        let kv = Self {
            inner: MemoryKv::new(),
            switch: switch.clone(),
        };
        (kv, switch)
    }

    pub fn inner(&self) -> &MemoryKv {
        &self.inner
    }
}

impl KeyValue for FlakyKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        if self.switch.failing.load(Ordering::SeqCst) {
            self.switch.rejected_writes.fetch_add(1, Ordering::SeqCst);
            return Err(ReplayError::Store("injected write failure".to_string()));
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

/// Recorder wired to a cooperative worker over `kv`, driven by a manual clock
pub fn recorder_with<K: KeyValue>(
    kv: K,
    start: Millis,
    config: RecorderConfig,
) -> (SessionRecorder, StoreWorker<K>, ManualClock) {
    let clock = ManualClock::new(start);
    let (worker, client) = StoreWorker::new(RecordingStore::new(kv));
    let recorder = SessionRecorder::new(config, Arc::new(clock.clone()), client);
    (recorder, worker, clock)
}

/// Player with default settings driven by a manual clock
pub fn player_at(start: Millis) -> (SessionPlayer, ManualClock) {
    let clock = ManualClock::new(start);
    let player = SessionPlayer::new(PlayerConfig::default(), Arc::new(clock.clone()));
    (player, clock)
}

/// Pump worker and recorder until every captured event is acknowledged
pub fn settle<K: KeyValue>(recorder: &mut SessionRecorder, worker: &mut StoreWorker<K>) -> bool {
    for _ in 0..8 {
        worker.process_pending();
        recorder.poll();
        if recorder.is_settled() {
            return true;
        }
    }
    false
}
