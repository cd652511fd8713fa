// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Run file lifecycle.
//!
//! - [`manager`] - Opening, appending to and closing run files
//! - [`naming`] - Timestamped run file names and output directory choice

pub mod manager;
pub mod naming;

pub use manager::{PacketOutcome, RawInputs, Run, RunManager, RunSummary};
pub use naming::RunNamer;
