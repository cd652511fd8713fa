// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types used throughout cpudaq.
//!
//! - [`AcqError`] - Error handling
//! - [`RunType`] - Run file / packet kind identifier

pub mod error;

pub use error::{AcqError, Result};

use serde::Serialize;

/// Kind of run file, and of the packets it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RunType {
    /// Detector frames merged with housekeeping readings
    Main,
    /// Diagnostic threshold scan
    Scurve,
    /// High-voltage power supply log
    HighVoltage,
}

/// Error returned when parsing a `RunType` from string fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRunTypeError {
    _private: (),
}

impl std::fmt::Display for ParseRunTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid run type, expected 'main', 'sc', or 'hv'")
    }
}

impl std::error::Error for ParseRunTypeError {}

impl std::str::FromStr for RunType {
    type Err = ParseRunTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "main" | "cpu" => Ok(RunType::Main),
            "sc" | "scurve" => Ok(RunType::Scurve),
            "hv" | "high_voltage" => Ok(RunType::HighVoltage),
            _ => Err(ParseRunTypeError { _private: () }),
        }
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl RunType {
    /// All run types, in slot order.
    pub const ALL: [RunType; 3] = [RunType::Main, RunType::Scurve, RunType::HighVoltage];

    /// Tag used in file names and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            RunType::Main => "MAIN",
            RunType::Scurve => "SC",
            RunType::HighVoltage => "HV",
        }
    }

    /// Numeric code written into file and packet headers.
    pub fn code(&self) -> u8 {
        match self {
            RunType::Main => 1,
            RunType::Scurve => 2,
            RunType::HighVoltage => 3,
        }
    }

    /// Inverse of [`RunType::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RunType::Main),
            2 => Some(RunType::Scurve),
            3 => Some(RunType::HighVoltage),
            _ => None,
        }
    }

    /// Index into per-type slot tables.
    pub(crate) fn slot(&self) -> usize {
        match self {
            RunType::Main => 0,
            RunType::Scurve => 1,
            RunType::HighVoltage => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_type_codes_round_trip() {
        for run_type in RunType::ALL {
            assert_eq!(RunType::from_code(run_type.code()), Some(run_type));
        }
        assert_eq!(RunType::from_code(0), None);
        assert_eq!(RunType::from_code(4), None);
    }

    #[test]
    fn test_run_type_from_str() {
        assert_eq!("main".parse::<RunType>().unwrap(), RunType::Main);
        assert_eq!("SC".parse::<RunType>().unwrap(), RunType::Scurve);
        assert_eq!("hv".parse::<RunType>().unwrap(), RunType::HighVoltage);
        assert!("camera".parse::<RunType>().is_err());
    }

    #[test]
    fn test_run_type_slots_are_distinct() {
        let slots: Vec<usize> = RunType::ALL.iter().map(|t| t.slot()).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }
}
