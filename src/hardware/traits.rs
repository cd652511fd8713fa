// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Capability traits for the instrument sub-systems.
//!
//! The acquisition core talks to hardware only through these traits. Real
//! drivers wrap vendor interfaces; [`super::sim`] provides a simulated
//! instrument.

use serde::Serialize;

use crate::core::Result;
use crate::format::{LightLevels, ScurveParams};

/// Instrument-wide acquisition mode set on the detector board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstrumentMode {
    /// Idle: no data produced
    Mode0,
    /// Periodic frame readout
    Acquire,
    /// Threshold scan in progress
    Scurve,
}

/// Switchable power domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SubSystem {
    DetectorBoard,
    HighVoltage,
    AnalogBoard,
    Thermistors,
}

impl SubSystem {
    pub const ALL: [SubSystem; 4] = [
        SubSystem::DetectorBoard,
        SubSystem::HighVoltage,
        SubSystem::AnalogBoard,
        SubSystem::Thermistors,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerStatus {
    On,
    Off,
}

/// Detector readout board.
pub trait DetectorBoard: Send + Sync {
    /// Number of level-1 and level-2 records per frame file.
    fn set_n_pkts(&self, n1: u32, n2: u32) -> Result<()>;

    fn set_test_mode(&self, enabled: bool) -> Result<()>;

    fn set_instrument_mode(&self, mode: InstrumentMode) -> Result<()>;

    fn instrument_mode(&self) -> InstrumentMode;

    /// Run a threshold scan. Blocks until the board reports completion.
    fn scurve(&self, params: &ScurveParams) -> Result<()>;
}

/// Analog light-sensor board.
pub trait AnalogBoard: Send + Sync {
    fn read_light_levels(&self) -> Result<LightLevels>;
}

/// Thermistor bus.
pub trait Thermistors: Send + Sync {
    /// Raw text output of one bus readout.
    fn read_raw(&self) -> Result<String>;
}

/// Power switching for the sub-systems.
pub trait PowerSwitch: Send + Sync {
    fn switch_on(&self, subsystem: SubSystem) -> Result<()>;

    fn switch_off(&self, subsystem: SubSystem) -> Result<()>;

    fn status(&self, subsystem: SubSystem) -> Result<PowerStatus>;
}
