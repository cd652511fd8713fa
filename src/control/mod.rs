// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Acquisition control.
//!
//! - [`signal`] - Cooperative cancellation flag used as the mode switch
//! - [`state`] - Controller state
//! - [`acquisition`] - Collection sessions

pub mod acquisition;
pub mod signal;
pub mod state;

pub use acquisition::{Acquisition, BACKUP_INTERVAL};
pub use signal::Signal;
pub use state::RunState;
