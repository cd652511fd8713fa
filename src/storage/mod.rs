// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Removable storage selection and background mirroring.
//!
//! - [`StorageSelector`] - Picks the directory new run files are written to
//! - [`BackupTask`] - Mirrors the primary device onto the secondary one

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::control::Signal;
use crate::core::{AcqError, Result};

/// Chooses the output directory for run files.
#[derive(Debug, Clone)]
pub struct StorageSelector {
    mountpoints: Vec<PathBuf>,
    fallback: PathBuf,
}

impl StorageSelector {
    pub fn new(mountpoints: Vec<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            mountpoints,
            fallback: fallback.into(),
        }
    }

    /// Configured mountpoints that are currently present.
    pub fn present(&self) -> Vec<&Path> {
        self.mountpoints
            .iter()
            .filter(|p| p.is_dir())
            .map(PathBuf::as_path)
            .collect()
    }

    /// One or two devices present: the first one. Otherwise the fallback.
    pub fn output_dir(&self) -> PathBuf {
        let present = self.present();
        match present.as_slice() {
            [first] | [first, _] => first.to_path_buf(),
            _ => self.fallback.clone(),
        }
    }

    /// Source and destination for mirroring, when at least two devices are present.
    pub fn backup_pair(&self) -> Option<(PathBuf, PathBuf)> {
        match self.present().as_slice() {
            [first, second, ..] => Some((first.to_path_buf(), second.to_path_buf())),
            _ => None,
        }
    }

    pub fn fallback(&self) -> &Path {
        &self.fallback
    }
}

/// Copy every regular file of `source` that is missing from `dest` or has a
/// different length there. Returns the number of files copied.
pub fn mirror_once(source: &Path, dest: &Path) -> Result<usize> {
    let entries = fs::read_dir(source)
        .map_err(|e| AcqError::io(format!("listing {}", source.display()), e))?;
    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|e| AcqError::io(format!("listing {}", source.display()), e))?;
        let meta = entry
            .metadata()
            .map_err(|e| AcqError::io(format!("stat {}", entry.path().display()), e))?;
        if !meta.is_file() {
            continue;
        }
        let target = dest.join(entry.file_name());
        let up_to_date = fs::metadata(&target)
            .map(|m| m.len() == meta.len())
            .unwrap_or(false);
        if up_to_date {
            continue;
        }
        fs::copy(entry.path(), &target)
            .map_err(|e| AcqError::io(format!("copying to {}", target.display()), e))?;
        debug!(file = %target.display(), "Mirrored");
        copied += 1;
    }
    Ok(copied)
}

/// Background thread mirroring one device onto another until stopped.
pub struct BackupTask {
    stop: Arc<Signal>,
    handle: JoinHandle<usize>,
}

impl BackupTask {
    /// Start mirroring `source` to `dest` every `interval`.
    pub fn spawn(source: PathBuf, dest: PathBuf, interval: Duration) -> Result<Self> {
        let stop = Arc::new(Signal::new());
        let thread_stop = Arc::clone(&stop);
        info!(source = %source.display(), dest = %dest.display(), "Starting data backup");

        let handle = std::thread::Builder::new()
            .name("backup".into())
            .spawn(move || {
                let mut total = 0;
                loop {
                    match mirror_once(&source, &dest) {
                        Ok(n) => total += n,
                        Err(e) => warn!(error = %e, "Backup pass failed"),
                    }
                    if thread_stop.wait_timeout(interval) {
                        break;
                    }
                }
                total
            })
            .map_err(|e| AcqError::io("spawning backup thread", e))?;

        Ok(Self { stop, handle })
    }

    /// Stop the task and return the number of files copied.
    pub fn stop(self) -> usize {
        self.stop.raise();
        match self.handle.join() {
            Ok(total) => total,
            Err(_) => {
                warn!("Backup thread panicked");
                0
            }
        }
    }
}
