// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! File I/O primitives.
//!
//! - [`sync_file`] - Thread-shared run file writer with running CRC-32
//! - [`arena`] - Memory-mapped read access for closed run files

pub mod arena;
pub mod sync_file;

pub use arena::MmapArena;
pub use sync_file::SyncFile;
