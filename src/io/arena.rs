// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Memory-mapped view of a closed run file.
//!
//! The arena owns the mapping; readers and packet iterators borrow from it,
//! so every slice they hand out is tied to the arena's lifetime.

use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use crate::core::{AcqError, Result};

/// A read-only memory-mapped file.
pub struct MmapArena {
    mmap: memmap2::Mmap,
    path: PathBuf,
}

impl MmapArena {
    /// Map a file for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| AcqError::io(format!("opening {}", path.display()), e))?;

        // The mapping is only ever exposed through borrows of `self`.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| AcqError::io(format!("mapping {}", path.display()), e))?;

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Bounds-checked sub-slice.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.mmap.get(offset..end))
            .ok_or_else(|| {
                AcqError::format(
                    self.path.display().to_string(),
                    format!(
                        "range {offset}+{len} exceeds file length {}",
                        self.mmap.len()
                    ),
                )
            })
    }
}

impl Deref for MmapArena {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.mmap
    }
}

impl std::fmt::Debug for MmapArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapArena")
            .field("path", &self.path)
            .field("len", &self.mmap.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();

        let arena = MmapArena::open(&path).unwrap();
        assert_eq!(arena.len(), 5);
        assert_eq!(arena.slice(1, 3).unwrap(), &[2, 3, 4]);
        assert!(arena.slice(3, 3).is_err());
        assert!(arena.slice(usize::MAX, 2).is_err());
        assert_eq!(&arena[..2], &[1, 2]);
    }

    #[test]
    fn test_open_missing_file() {
        let err = MmapArena::open("/nonexistent/run.dat").unwrap_err();
        assert!(matches!(err, AcqError::Io { .. }));
    }
}
