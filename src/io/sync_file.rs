// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Mutex-guarded file writer with a running CRC-32.
//!
//! Every byte appended through [`SyncFile`] is folded into the checksum, so
//! the checksum always matches the bytes on disk. Producers on several
//! threads may share one writer; appends are serialized in lock-acquisition
//! order.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::core::{AcqError, Result};
use crate::format::Encode;

struct State {
    /// `None` once closed
    file: Option<File>,
    hasher: crc32fast::Hasher,
    bytes: u64,
}

/// A file shared between producer threads.
pub struct SyncFile {
    path: PathBuf,
    state: Mutex<State>,
}

impl SyncFile {
    /// Create or truncate `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| AcqError::io(format!("creating {}", path.display()), e))?;
        debug!(path = %path.display(), "Opened run file");
        Ok(Self {
            path,
            state: Mutex::new(State {
                file: Some(file),
                hasher: crc32fast::Hasher::new(),
                bytes: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking producer leaves the byte count and CRC consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Encode a record and append it.
    ///
    /// Returns the number of bytes written.
    pub fn write<E: Encode>(&self, record: &E) -> Result<usize> {
        let bytes = record
            .to_bytes()
            .map_err(|e| AcqError::io(format!("encoding record for {}", self.path.display()), e))?;
        self.write_bytes(&bytes)
    }

    /// Append raw bytes.
    pub fn write_bytes(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.lock();
        let State {
            file,
            hasher,
            bytes,
        } = &mut *state;
        let file = file.as_mut().ok_or_else(|| AcqError::WriterClosed {
            path: self.path.clone(),
        })?;

        let mut written = 0;
        while written < buf.len() {
            match file.write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => {
                    hasher.update(&buf[written..written + n]);
                    written += n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    *bytes += written as u64;
                    return Err(AcqError::io(
                        format!(
                            "writing {} bytes to {} ({written} accepted)",
                            buf.len(),
                            self.path.display()
                        ),
                        e,
                    ));
                }
            }
        }
        *bytes += written as u64;

        if written < buf.len() {
            return Err(AcqError::ShortWrite {
                path: self.path.clone(),
                expected: buf.len(),
                written,
            });
        }
        Ok(written)
    }

    /// CRC-32 of everything written so far.
    pub fn checksum(&self) -> u32 {
        self.lock().hasher.clone().finalize()
    }

    pub fn bytes_written(&self) -> u64 {
        self.lock().bytes
    }

    pub fn is_closed(&self) -> bool {
        self.lock().file.is_none()
    }

    /// Flush and release the file. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if let Some(mut file) = state.file.take() {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|e| AcqError::io(format!("closing {}", self.path.display()), e))?;
            debug!(path = %self.path.display(), bytes = state.bytes, "Closed run file");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SyncFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncFile")
            .field("path", &self.path)
            .field("bytes", &self.bytes_written())
            .finish()
    }
}
