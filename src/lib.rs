// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # cpudaq
//!
//! Onboard data acquisition: sensor output files in, checksummed run files
//! out.
//!
//! Sub-systems deposit detector frames (`frm*`), S-curve scans (`sc*`) and
//! high-voltage logs (`hv*`) into a data directory. The ingest pipeline
//! watches that directory, merges each frame with a housekeeping reading
//! and appends the resulting packet to the open run file of the matching
//! type. Run files rotate at a configured packet count and end with a
//! CRC-32 trailer.
//!
//! ## Architecture
//!
//! - `core/` - Error type and run type identifier
//! - `format/` - Binary run file layout, packet builders and the reader
//! - `io/` - Synchronized CRC-tracking writer and memory-mapped input
//! - `run/` - Run lifecycle and file naming
//! - `ingest/` - Directory watch, input classification and the ingest loop
//! - `control/` - Mode switch and collection sessions
//! - `housekeeping/` - Light and temperature collectors
//! - `hardware/` - Sub-system traits and a simulated instrument
//! - `storage/` - Output device selection and backup
//! - `config/` - Layered TOML configuration
//!
//! ## Example: Verifying a run file
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use cpudaq::RunFileReader;
//!
//! let reader = RunFileReader::open("CPU_RUN_MAIN__2026_10_18__10_00_00.dat")?;
//! let report = reader.verify();
//! println!("{} packets, crc ok: {}", report.packet_count, report.is_ok());
//! # Ok(())
//! # }
//! ```

// Core types
pub mod core;

pub use core::{AcqError, Result, RunType};

// Binary format
pub mod format;

pub use format::{CpuTimestamp, Encode, Packet, RecordLayout, RunFileReader, Verification};

// File I/O
pub mod io;

pub use io::SyncFile;

// Run lifecycle
pub mod run;

pub use run::{PacketOutcome, RawInputs, RunManager, RunSummary};

// Sensor file ingest
pub mod ingest;

pub use ingest::{IngestOutcome, IngestPipeline, IngestReport};

// Session control
pub mod control;

pub use control::{Acquisition, RunState, Signal};

pub mod config;

pub use config::Config;

pub mod hardware;
pub mod housekeeping;
pub mod storage;
