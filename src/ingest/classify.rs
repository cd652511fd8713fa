// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Input file classification by name prefix.

use std::path::Path;

use crate::core::RunType;

/// Kind of sensor output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `frm*`: detector board frame
    Frame,
    /// `sc*`: S-curve scan result
    Scurve,
    /// `hv*`: high-voltage power supply log
    HighVoltage,
}

impl InputKind {
    /// Run type the input is recorded into.
    pub fn run_type(&self) -> RunType {
        match self {
            InputKind::Frame => RunType::Main,
            InputKind::Scurve => RunType::Scurve,
            InputKind::HighVoltage => RunType::HighVoltage,
        }
    }
}

/// Classify a file by its name. `None` for anything unrecognised.
pub fn classify(path: &Path) -> Option<InputKind> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with("frm") {
        Some(InputKind::Frame)
    } else if name.starts_with("sc") {
        Some(InputKind::Scurve)
    } else if name.starts_with("hv") {
        Some(InputKind::HighVoltage)
    } else {
        None
    }
}
