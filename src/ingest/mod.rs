// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Ingest of sensor output files.
//!
//! - [`event`] - Directory watch and event sources
//! - [`classify`] - Input kind by file name prefix
//! - [`pipeline`] - The loop turning inputs into packets

pub mod classify;
pub mod event;
pub mod pipeline;

pub use classify::{classify, InputKind};
pub use event::{ChannelSource, DirectoryWatcher, EventSource, IngestEvent, Poll};
pub use pipeline::{IngestOptions, IngestOutcome, IngestPipeline, IngestReport, IngestStats};
