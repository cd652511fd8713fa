// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Sources of "new input file" events.
//!
//! [`DirectoryWatcher`] subscribes to creation events on a directory through
//! `notify` and forwards them over a `crossbeam-channel`. [`ChannelSource`]
//! accepts events pushed by hand. Both are polled with a timeout so the
//! consumer can check for cancellation between events.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::core::{AcqError, Result};

/// Something appeared in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    /// A regular file was created or moved in
    FileCreated(PathBuf),
    DirectoryCreated(PathBuf),
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    Event(IngestEvent),
    Timeout,
    /// The producing side has gone away
    Closed,
}

/// A pollable stream of ingest events.
pub trait EventSource: Send {
    /// Wait up to `timeout` for the next event.
    fn poll(&self, timeout: Duration) -> Poll;
}

fn poll_channel(rx: &Receiver<IngestEvent>, timeout: Duration) -> Poll {
    match rx.recv_timeout(timeout) {
        Ok(event) => Poll::Event(event),
        Err(RecvTimeoutError::Timeout) => Poll::Timeout,
        Err(RecvTimeoutError::Disconnected) => Poll::Closed,
    }
}

/// Events pushed through a channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<IngestEvent>,
}

impl ChannelSource {
    /// Create a source and the sender feeding it.
    pub fn channel() -> (Sender<IngestEvent>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self { rx })
    }
}

impl EventSource for ChannelSource {
    fn poll(&self, timeout: Duration) -> Poll {
        poll_channel(&self.rx, timeout)
    }
}

/// Creation events for one directory.
///
/// The watch is released when the watcher is dropped.
pub struct DirectoryWatcher {
    dir: PathBuf,
    rx: Receiver<IngestEvent>,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Start watching `dir` (non-recursively).
    ///
    /// # Errors
    ///
    /// [`AcqError::Watch`] if the directory does not exist or the platform
    /// watch service cannot be initialised.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(AcqError::watch(&dir, "not a directory"));
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for ingest in translate(event) {
                    // Receiver gone means the pipeline has finished.
                    let _ = tx.send(ingest);
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        })
        .map_err(|e| AcqError::watch(&dir, e.to_string()))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| AcqError::watch(&dir, e.to_string()))?;
        info!(dir = %dir.display(), "Watching for incoming data");

        Ok(Self {
            dir,
            rx,
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EventSource for DirectoryWatcher {
    fn poll(&self, timeout: Duration) -> Poll {
        poll_channel(&self.rx, timeout)
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        debug!(dir = %self.dir.display(), "Released directory watch");
    }
}

/// Map a raw notification onto creation events.
fn translate(event: Event) -> Vec<IngestEvent> {
    let created = |path: PathBuf| {
        if path.is_dir() {
            IngestEvent::DirectoryCreated(path)
        } else {
            IngestEvent::FileCreated(path)
        }
    };

    match event.kind {
        EventKind::Create(CreateKind::Folder) => event
            .paths
            .into_iter()
            .map(IngestEvent::DirectoryCreated)
            .collect(),
        // A rename inside the directory also emits a `Both` event; only the
        // `To` half is taken so each file is reported once.
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(created).collect()
        }
        _ => Vec::new(),
    }
}
