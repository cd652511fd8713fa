// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CLI subcommands.

mod acquire;
mod inspect;
mod verify;

pub use acquire::AcquireCmd;
pub use inspect::InspectCmd;
pub use verify::VerifyCmd;
