//! End-to-end recording workflows: capture, flush, store failures and merge

mod common;

use common::builders::scenario_recording;
use common::mock_helpers::{recorder_with, settle, FlakyKv};
use common::{actor, test_timeout};
use session_replay::{
    config::RecorderConfig,
    session::{ChannelSource, MetadataPatch},
    EventType, Interaction, ManualClock, MemoryKv, RecordingStore, SessionPlayer,
    SessionRecorder, StoreWorker,
};
use std::sync::Arc;

#[test]
fn test_scenario_record_persist_and_seek() {
    let (mut recorder, mut worker, clock) =
        recorder_with(MemoryKv::new(), 1000, RecorderConfig::default());
    let id = recorder.start("Scenario", actor("u1")).unwrap();

    clock.set(1100);
    recorder.capture(&Interaction::pointer_move(10.0, 10.0));
    clock.set(1300);
    recorder.capture(&Interaction::click(10.0, 10.0, Some("a.link")));
    clock.set(1800);
    recorder.capture(&Interaction::scroll(0.0, 250.0));
    clock.set(2000);
    recorder.stop().unwrap();
    assert!(settle(&mut recorder, &mut worker));

    let stored = worker.store().get(&id).unwrap();
    assert_eq!(stored.duration, 1000);
    assert_eq!(stored.events.len(), 5);
    assert!(stored.is_ordered());

    let mut player = SessionPlayer::new(Default::default(), Arc::new(ManualClock::new(0)));
    player.load(stored);

    player.seek(150.0);
    let index = player.current_event_index().unwrap();
    assert_eq!(player.recording().unwrap().events[index].event_type, EventType::Cursor);

    player.seek(1000.0);
    assert_eq!(player.current_time(), 1000.0);
    assert_eq!(player.current_event_index(), Some(4));
}

#[test]
fn test_store_outage_retains_buffer_until_recovery() {
    let (kv, switch) = FlakyKv::new();
    let (mut recorder, mut worker, clock) = recorder_with(kv, 0, RecorderConfig::default());
    let id = recorder.start("Outage", actor("u1")).unwrap();
    recorder.capture(&Interaction::click(1.0, 1.0, None));

    switch.fail();
    clock.advance(5000);
    recorder.poll();
    worker.process_pending();
    recorder.poll();

    assert!(switch.rejected_writes() > 0);
    assert_eq!(recorder.buffered_len(), 2);
    assert_eq!(recorder.stats().flushes_failed, 1);
    assert!(worker.store().find(&id).unwrap().is_none());

    clock.advance(10);
    recorder.capture(&Interaction::click(2.0, 2.0, None));

    switch.recover();
    clock.advance(5000);
    recorder.poll();
    worker.process_pending();
    recorder.poll();

    assert_eq!(recorder.buffered_len(), 0);
    assert_eq!(worker.store().get(&id).unwrap().events.len(), 3);
}

#[test]
fn test_final_flush_retried_after_failure() {
    let (kv, switch) = FlakyKv::new();
    let (mut recorder, mut worker, clock) = recorder_with(kv, 0, RecorderConfig::default());
    let id = recorder.start("Final", actor("u1")).unwrap();
    clock.advance(100);

    switch.fail();
    recorder.stop().unwrap();
    worker.process_pending();
    recorder.poll();
    assert!(!recorder.is_settled());

    switch.recover();
    clock.advance(5000);
    assert!(settle(&mut recorder, &mut worker));

    let stored = worker.store().get(&id).unwrap();
    assert!(stored.is_finalized());
    assert_eq!(stored.events.len(), 2);
}

#[test]
fn test_resent_events_are_stored_once() {
    let mut store = RecordingStore::new(MemoryKv::new());
    let recording = scenario_recording("rec-1");

    let mut partial = recording.clone();
    partial.events.truncate(2);
    partial.end_time = None;
    partial.duration = 300;

    store.upsert(partial.clone()).unwrap();
    store.upsert(recording.clone()).unwrap();
    store.upsert(partial).unwrap();
    store.upsert(recording).unwrap();

    let stored = store.get("rec-1").unwrap();
    assert_eq!(stored.events.len(), 5);
    assert_eq!(stored.duration, 1000);
    assert_eq!(stored.end_time, Some(2000));
}

#[test]
fn test_metadata_edit_survives_flushes() {
    let (mut recorder, mut worker, clock) =
        recorder_with(MemoryKv::new(), 0, RecorderConfig::default());
    let id = recorder.start("Original", actor("u1")).unwrap();
    recorder.capture(&Interaction::view_change("overview"));

    clock.advance(5000);
    assert!(settle(&mut recorder, &mut worker));

    worker
        .store_mut()
        .update_metadata(&id, &MetadataPatch::title("Renamed").with_tags(vec!["qa".into()]))
        .unwrap();

    clock.advance(10);
    recorder.capture(&Interaction::view_change("charts"));
    clock.advance(5000);
    recorder.stop().unwrap();
    assert!(settle(&mut recorder, &mut worker));

    let stored = worker.store().get(&id).unwrap();
    assert_eq!(stored.metadata.title, "Renamed");
    assert_eq!(stored.metadata.tags, vec!["qa"]);
    assert_eq!(stored.metadata.views, vec!["overview", "charts"]);
}

#[test]
fn test_independent_recorders_share_a_store() {
    let shared = MemoryKv::new();
    let (mut first, mut first_worker, first_clock) =
        recorder_with(shared.clone(), 0, RecorderConfig::default());
    let (mut second, mut second_worker, second_clock) =
        recorder_with(shared.clone(), 50, RecorderConfig::default());

    let first_id = first.start("Tab A", actor("u1")).unwrap();
    let second_id = second.start("Tab B", actor("u22")).unwrap();
    first_clock.advance(100);
    second_clock.advance(100);
    first.stop().unwrap();
    second.stop().unwrap();

    assert!(settle(&mut first, &mut first_worker));
    assert!(settle(&mut second, &mut second_worker));

    let store = RecordingStore::new(shared);
    let ids: Vec<_> = store
        .list_summaries()
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert!(ids.contains(&first_id));
    assert!(ids.contains(&second_id));
}

#[test]
fn test_participants_join_and_leave() {
    let (mut recorder, mut worker, clock) =
        recorder_with(MemoryKv::new(), 0, RecorderConfig::default());
    let id = recorder.start("Pairing", actor("u1")).unwrap();
    let guest = actor("guest");

    clock.advance(100);
    recorder.join(&guest).unwrap();
    clock.advance(100);
    recorder.leave("guest").unwrap();
    clock.advance(100);
    recorder.join(&guest).unwrap();
    clock.advance(100);
    recorder.stop().unwrap();
    assert!(settle(&mut recorder, &mut worker));

    let stored = worker.store().get(&id).unwrap();
    assert_eq!(stored.participants.len(), 2);
    let entry = stored.participant("guest").unwrap();
    assert_eq!(entry.joined_at, 300);
    assert!(entry.is_active());
}

#[test]
fn test_channel_source_feeds_recorder() {
    let (mut recorder, _worker, clock) =
        recorder_with(MemoryKv::new(), 0, RecorderConfig::default());
    recorder.start("Input", actor("u1")).unwrap();

    let (sender, mut source) = ChannelSource::new();
    for i in 0..5 {
        sender.send(Interaction::pointer_move(i as f64, 0.0)).unwrap();
    }
    sender.send(Interaction::click(4.0, 0.0, None)).unwrap();
    assert_eq!(recorder.pump(&mut source), 2);

    clock.advance(100);
    sender.send(Interaction::pointer_move(9.0, 9.0)).unwrap();
    assert_eq!(recorder.pump(&mut source), 1);
}

#[test]
fn test_recorder_with_threaded_worker() {
    let (client, handle) = StoreWorker::spawn(RecordingStore::new(MemoryKv::new())).unwrap();
    let clock = ManualClock::new(0);
    let mut recorder =
        SessionRecorder::new(RecorderConfig::default(), Arc::new(clock.clone()), client.clone());

    let id = recorder.start("Threaded", actor("u1")).unwrap();
    clock.advance(40);
    recorder.capture(&Interaction::click(1.0, 2.0, None));
    clock.advance(40);
    recorder.stop().unwrap();

    let deadline = std::time::Instant::now() + test_timeout();
    while !recorder.is_settled() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(1));
        recorder.poll();
    }
    assert!(recorder.is_settled());

    let stored = client.get(&id).unwrap().wait(test_timeout()).unwrap();
    assert_eq!(stored.events.len(), 3);

    client.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_cancelled_recording_never_leaks_into_next() {
    let (kv, switch) = FlakyKv::new();
    let (mut recorder, mut worker, clock) = recorder_with(kv, 0, RecorderConfig::default());
    let first = recorder.start("A", actor("u1")).unwrap();
    recorder.capture(&Interaction::click(1.0, 1.0, Some("a-only")));
    clock.advance(5000);
    recorder.poll();
    assert!(recorder.has_flush_in_flight());

    switch.fail();
    recorder.cancel();
    let second = recorder.start("B", actor("u1")).unwrap();
    worker.process_pending();
    recorder.poll();
    assert_eq!(recorder.buffered_len(), 1);

    switch.recover();
    clock.advance(5000);
    assert!(settle(&mut recorder, &mut worker));

    assert!(worker.store().find(&first).unwrap().is_none());
    let stored = worker.store().get(&second).unwrap();
    assert_eq!(stored.events.len(), 1);
    assert!(stored.events.iter().all(|e| e.timestamp >= stored.start_time));
    assert!(!stored.events.iter().any(|e| e.payload.to_string().contains("a-only")));
}

#[test]
fn test_failed_flush_of_stopped_recording_stays_with_it() {
    let (kv, switch) = FlakyKv::new();
    let (mut recorder, mut worker, clock) = recorder_with(kv, 0, RecorderConfig::default());
    let first = recorder.start("A", actor("u1")).unwrap();
    recorder.capture(&Interaction::click(1.0, 1.0, Some("a-only")));
    clock.advance(5000);
    recorder.poll();

    switch.fail();
    recorder.stop().unwrap();
    let second = recorder.start("B", actor("u1")).unwrap();
    recorder.capture(&Interaction::click(2.0, 2.0, Some("b-only")));
    worker.process_pending();
    recorder.poll();
    // only B's own events are waiting for the next flush
    assert_eq!(recorder.buffered_len(), 2);

    switch.recover();
    clock.advance(5000);
    assert!(settle(&mut recorder, &mut worker));

    let a = worker.store().get(&first).unwrap();
    assert!(a.is_finalized());
    assert_eq!(a.events.len(), 3);
    let b = worker.store().get(&second).unwrap();
    assert_eq!(b.events.len(), 2);
    assert!(b.events.iter().all(|e| e.timestamp >= b.start_time));
    assert!(!b.events.iter().any(|e| e.payload.to_string().contains("a-only")));
}

#[test]
fn test_outage_across_consecutive_recordings_keeps_both() {
    let (kv, switch) = FlakyKv::new();
    let (mut recorder, mut worker, clock) = recorder_with(kv, 0, RecorderConfig::default());
    let first = recorder.start("A", actor("u1")).unwrap();
    recorder.capture(&Interaction::click(1.0, 1.0, None));

    switch.fail();
    clock.advance(100);
    recorder.stop().unwrap();
    worker.process_pending();

    let second = recorder.start("B", actor("u1")).unwrap();
    clock.advance(100);
    recorder.stop().unwrap();
    recorder.poll();
    assert_eq!(recorder.pending_final_count(), 2);

    switch.recover();
    clock.advance(5000);
    assert!(settle(&mut recorder, &mut worker));

    let a = worker.store().get(&first).unwrap();
    assert!(a.is_finalized());
    assert_eq!(a.events.len(), 3);
    assert!(worker.store().get(&second).unwrap().is_finalized());
}
