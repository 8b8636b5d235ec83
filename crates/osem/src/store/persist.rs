//! Persist actor: serialises event-store writes onto one background thread.
//!
//! Mutations enqueue a full-document snapshot; the actor coalesces bursts to
//! the newest document and writes it atomically (temp file + rename). A
//! mutation is therefore never dropped: the last write always reflects every
//! prior mutation.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, warn};

use crate::error::StoreError;
use crate::model::Event;

pub(crate) enum PersistRequest {
    Write(Vec<Event>),
    Flush(Sender<()>),
}

pub(crate) struct Persister {
    tx: Option<Sender<PersistRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl Persister {
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = unbounded::<PersistRequest>();
        let handle = std::thread::spawn(move || run(path, rx));

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queues the latest full document for writing.
    pub fn enqueue(&self, events: Vec<Event>) {
        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(PersistRequest::Write(events)).is_ok());
        if !sent {
            error!("Persist thread is gone; event store write dropped");
        }
    }

    /// Blocks until every queued write has reached disk.
    pub fn flush(&self) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        let (ack_tx, ack_rx) = unbounded();
        if tx.send(PersistRequest::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.flush();
        // Closing the channel ends the actor loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Persist thread panicked during shutdown");
            }
        }
    }
}

fn run(path: PathBuf, rx: Receiver<PersistRequest>) {
    while let Ok(request) = rx.recv() {
        let mut document = None;
        let mut acks: Vec<Sender<()>> = Vec::new();

        match request {
            PersistRequest::Write(events) => document = Some(events),
            PersistRequest::Flush(ack) => acks.push(ack),
        }

        // Coalesce whatever queued up behind this request.
        while let Ok(next) = rx.try_recv() {
            match next {
                PersistRequest::Write(events) => document = Some(events),
                PersistRequest::Flush(ack) => acks.push(ack),
            }
        }

        if let Some(events) = document {
            if let Err(e) = write_document(&path, &events) {
                error!("Failed to persist event store: {}", e);
            } else {
                debug!("Persisted {} events to {}", events.len(), path.display());
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
}

/// Writes the document atomically: temp file in the same directory, then
/// rename over the target.
pub(crate) fn write_document(path: &Path, events: &[Event]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::WriteFile {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let json = serde_json::to_string_pretty(events).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes()).map_err(|e| StoreError::WriteFile {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Loads the document; a missing file is an empty store, unreadable JSON is
/// `Corrupt`.
pub(crate) fn load_document(path: &Path) -> Result<Vec<Event>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StoreError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}
