//! Store worker and client
//!
//! The store is accessed asynchronously: callers submit commands through a
//! [`StoreClient`] and get a [`PendingReply`] back immediately. The reply is
//! filled in out-of-band by the [`StoreWorker`], so a recorder flush or a
//! player load never delays the caller's tick.
//!
//! The worker can run in two modes:
//!
//! - **Threaded**: [`StoreWorker::spawn`] runs the command loop on its own
//!   thread until shutdown or until every client is dropped
//! - **Cooperative**: the host calls [`StoreWorker::process_pending`] from its
//!   own loop, which keeps everything on one execution context

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{KeyValue, RecordingStore, RecordingSummary};
use crate::error::{ReplayError, Result};
use crate::markers::{Annotation, Author, Bookmark, NewAnnotation, TimelineMarkers};
use crate::session::types::{MetadataPatch, SessionRecording};
use crate::types::Millis;

type Reply<T> = Sender<Result<T>>;

/// Commands that can be sent to the store worker
#[derive(Debug)]
pub enum StoreCommand {
    /// Create-or-merge a recording
    Upsert {
        recording: SessionRecording,
        reply: Reply<()>,
    },
    /// Shallow-merge metadata
    UpdateMetadata {
        id: String,
        patch: MetadataPatch,
        reply: Reply<SessionRecording>,
    },
    /// Fetch one recording
    Get {
        id: String,
        reply: Reply<SessionRecording>,
    },
    /// Summaries of all recordings
    List { reply: Reply<Vec<RecordingSummary>> },
    /// Delete a recording
    Delete { id: String, reply: Reply<()> },
    /// Annotations and bookmarks of a recording
    Markers {
        recording_id: String,
        reply: Reply<TimelineMarkers>,
    },
    /// Add an annotation
    AddAnnotation {
        recording_id: String,
        draft: NewAnnotation,
        now: Millis,
        reply: Reply<Annotation>,
    },
    /// Add a bookmark
    AddBookmark {
        recording_id: String,
        timestamp: Millis,
        label: String,
        color: String,
        author: Author,
        reply: Reply<Bookmark>,
    },
    /// Stop the worker loop
    Shutdown,
}

/// A reply that will be filled in by the worker
#[derive(Debug)]
pub struct PendingReply<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> PendingReply<T> {
    /// Take the result if it has arrived.
    ///
    /// Returns `None` while the command is still pending. A worker that went
    /// away without replying yields a channel error.
    pub fn try_take(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ReplayError::Channel(
                "store worker dropped the request".to_string(),
            ))),
        }
    }

    /// Block until the result arrives or `timeout` elapses
    pub fn wait(self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ReplayError::Channel(format!(
                "store did not reply within {:?}",
                timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(ReplayError::Channel(
                "store worker dropped the request".to_string(),
            )),
        }
    }
}

/// Cloneable handle for submitting store commands
#[derive(Debug, Clone)]
pub struct StoreClient {
    command_sender: Sender<StoreCommand>,
}

impl StoreClient {
    fn submit<T>(&self, build: impl FnOnce(Reply<T>) -> StoreCommand) -> Result<PendingReply<T>> {
        let (reply, receiver) = bounded(1);
        self.command_sender
            .send(build(reply))
            .map_err(|_| ReplayError::Channel("store worker is not running".to_string()))?;
        Ok(PendingReply { receiver })
    }

    /// Create-or-merge a recording
    pub fn upsert(&self, recording: SessionRecording) -> Result<PendingReply<()>> {
        self.submit(|reply| StoreCommand::Upsert { recording, reply })
    }

    /// Shallow-merge metadata into a recording
    pub fn update_metadata(
        &self,
        id: impl Into<String>,
        patch: MetadataPatch,
    ) -> Result<PendingReply<SessionRecording>> {
        let id = id.into();
        self.submit(|reply| StoreCommand::UpdateMetadata { id, patch, reply })
    }

    /// Fetch a recording
    pub fn get(&self, id: impl Into<String>) -> Result<PendingReply<SessionRecording>> {
        let id = id.into();
        self.submit(|reply| StoreCommand::Get { id, reply })
    }

    /// List recording summaries
    pub fn list(&self) -> Result<PendingReply<Vec<RecordingSummary>>> {
        self.submit(|reply| StoreCommand::List { reply })
    }

    /// Delete a recording
    pub fn delete(&self, id: impl Into<String>) -> Result<PendingReply<()>> {
        let id = id.into();
        self.submit(|reply| StoreCommand::Delete { id, reply })
    }

    /// Fetch the markers of a recording
    pub fn markers(
        &self,
        recording_id: impl Into<String>,
    ) -> Result<PendingReply<TimelineMarkers>> {
        let recording_id = recording_id.into();
        self.submit(|reply| StoreCommand::Markers {
            recording_id,
            reply,
        })
    }

    /// Add an annotation, validated against the stored duration
    pub fn add_annotation(
        &self,
        recording_id: impl Into<String>,
        draft: NewAnnotation,
        now: Millis,
    ) -> Result<PendingReply<Annotation>> {
        let recording_id = recording_id.into();
        self.submit(|reply| StoreCommand::AddAnnotation {
            recording_id,
            draft,
            now,
            reply,
        })
    }

    /// Add a bookmark, validated against the stored duration
    pub fn add_bookmark(
        &self,
        recording_id: impl Into<String>,
        timestamp: Millis,
        label: impl Into<String>,
        color: impl Into<String>,
        author: Author,
    ) -> Result<PendingReply<Bookmark>> {
        let recording_id = recording_id.into();
        let label = label.into();
        let color = color.into();
        self.submit(|reply| StoreCommand::AddBookmark {
            recording_id,
            timestamp,
            label,
            color,
            author,
            reply,
        })
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(StoreCommand::Shutdown);
    }
}

/// Owns a [`RecordingStore`] and executes submitted commands
pub struct StoreWorker<K: KeyValue> {
    store: RecordingStore<K>,
    command_receiver: Receiver<StoreCommand>,
    running: bool,
}

impl<K: KeyValue> StoreWorker<K> {
    /// Create a worker and its client
    pub fn new(store: RecordingStore<K>) -> (Self, StoreClient) {
        let (command_sender, command_receiver) = unbounded();
        let worker = Self {
            store,
            command_receiver,
            running: true,
        };
        (worker, StoreClient { command_sender })
    }

    /// Access the underlying store
    pub fn store(&self) -> &RecordingStore<K> {
        &self.store
    }

    /// Mutable access to the underlying store
    pub fn store_mut(&mut self) -> &mut RecordingStore<K> {
        &mut self.store
    }

    /// Check if the worker accepts more commands
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Execute every queued command; returns how many were handled
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while self.running {
            match self.command_receiver.try_recv() {
                Ok(command) => {
                    self.handle_command(command);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running = false;
                    break;
                }
            }
        }
        handled
    }

    /// Run the command loop until shutdown or until all clients are dropped
    pub fn run(mut self) {
        tracing::info!("Store worker started");
        while self.running {
            match self.command_receiver.recv() {
                Ok(command) => self.handle_command(command),
                Err(_) => self.running = false,
            }
        }
        tracing::info!("Store worker stopped");
    }

    /// Handle a single command
    fn handle_command(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::Upsert { recording, reply } => {
                let id = recording.id.clone();
                let result = self.store.upsert(recording).map(|_| ());
                if let Err(e) = &result {
                    tracing::warn!("Upsert of {} failed: {}", id, e);
                }
                let _ = reply.send(result);
            }
            StoreCommand::UpdateMetadata { id, patch, reply } => {
                let _ = reply.send(self.store.update_metadata(&id, &patch));
            }
            StoreCommand::Get { id, reply } => {
                let _ = reply.send(self.store.get(&id));
            }
            StoreCommand::List { reply } => {
                let _ = reply.send(self.store.list_summaries());
            }
            StoreCommand::Delete { id, reply } => {
                let _ = reply.send(self.store.delete(&id));
            }
            StoreCommand::Markers {
                recording_id,
                reply,
            } => {
                let _ = reply.send(self.store.markers(&recording_id));
            }
            StoreCommand::AddAnnotation {
                recording_id,
                draft,
                now,
                reply,
            } => {
                let _ = reply.send(self.store.add_annotation(&recording_id, draft, now));
            }
            StoreCommand::AddBookmark {
                recording_id,
                timestamp,
                label,
                color,
                author,
                reply,
            } => {
                let result = self
                    .store
                    .add_bookmark(&recording_id, timestamp, &label, &color, author);
                let _ = reply.send(result);
            }
            StoreCommand::Shutdown => {
                self.running = false;
            }
        }
    }
}

impl<K: KeyValue + 'static> StoreWorker<K> {
    /// Run a worker on its own thread
    pub fn spawn(store: RecordingStore<K>) -> Result<(StoreClient, JoinHandle<()>)> {
        let (worker, client) = Self::new(store);
        let handle = std::thread::Builder::new()
            .name("store-worker".to_string())
            .spawn(move || worker.run())?;
        Ok((client, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    #[test]
    fn test_reply_pending_until_processed() {
        let (mut worker, client) = StoreWorker::new(RecordingStore::new(MemoryKv::new()));

        let pending = client
            .upsert(SessionRecording::new("rec-1", "Demo", 0))
            .unwrap();
        assert!(pending.try_take().is_none());

        assert_eq!(worker.process_pending(), 1);
        assert!(pending.try_take().unwrap().is_ok());
        assert!(worker.store().find("rec-1").unwrap().is_some());
    }

    #[test]
    fn test_get_missing_reports_not_found() {
        let (mut worker, client) = StoreWorker::new(RecordingStore::new(MemoryKv::new()));
        let pending = client.get("missing").unwrap();
        worker.process_pending();
        assert!(pending.try_take().unwrap().unwrap_err().is_not_found());
    }

    #[test]
    fn test_shutdown_stops_processing() {
        let (mut worker, client) = StoreWorker::new(RecordingStore::new(MemoryKv::new()));
        client.shutdown();
        let pending = client.list().unwrap();

        worker.process_pending();
        assert!(!worker.is_running());
        drop(worker);

        // dropped without a reply
        assert!(matches!(
            pending.try_take(),
            Some(Err(ReplayError::Channel(_)))
        ));
        assert!(client.list().is_err());
    }

    #[test]
    fn test_marker_commands() {
        let (mut worker, client) = StoreWorker::new(RecordingStore::new(MemoryKv::new()));
        let mut recording = SessionRecording::new("rec-1", "Demo", 0);
        recording.extend_duration_to(1000);
        worker.store_mut().upsert(recording).unwrap();
        let author = Author::new("Ada", "#ff0066");

        let annotation = client
            .add_annotation("rec-1", NewAnnotation::new(200, "Look here", author.clone()), 5)
            .unwrap();
        let bookmark = client
            .add_bookmark("rec-1", 900, "end", "#f59e0b", author.clone())
            .unwrap();
        let too_late = client
            .add_bookmark("rec-1", 1500, "past", "#f59e0b", author)
            .unwrap();
        assert!(annotation.try_take().is_none());

        worker.process_pending();
        let annotation = annotation.try_take().unwrap().unwrap();
        bookmark.try_take().unwrap().unwrap();
        assert!(matches!(
            too_late.try_take(),
            Some(Err(ReplayError::Validation(_)))
        ));

        let markers = client.markers("rec-1").unwrap();
        worker.process_pending();
        let markers = markers.try_take().unwrap().unwrap();
        assert_eq!(markers.len(), 2);
        assert!(markers.annotation(&annotation.id).is_some());
    }

    #[test]
    fn test_threaded_worker() {
        let (client, handle) = StoreWorker::spawn(RecordingStore::new(MemoryKv::new())).unwrap();

        client
            .upsert(SessionRecording::new("rec-1", "Demo", 0))
            .unwrap()
            .wait(Duration::from_secs(1))
            .unwrap();
        let summaries = client.list().unwrap().wait(Duration::from_secs(1)).unwrap();
        assert_eq!(summaries.len(), 1);

        client.shutdown();
        handle.join().unwrap();
    }
}
