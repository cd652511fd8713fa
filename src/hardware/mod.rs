// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Hardware collaborators.
//!
//! - [`traits`] - Capability traits the acquisition core depends on
//! - [`sim`] - Simulated instrument producing sensor files

pub mod sim;
pub mod traits;

use std::sync::Arc;

pub use sim::{SimFiles, SimInstrument};
pub use traits::{
    AnalogBoard, DetectorBoard, InstrumentMode, PowerStatus, PowerSwitch, SubSystem, Thermistors,
};

/// The set of sub-system handles an acquisition session drives.
#[derive(Clone)]
pub struct Instrument {
    pub detector: Arc<dyn DetectorBoard>,
    pub analog: Arc<dyn AnalogBoard>,
    pub thermistors: Arc<dyn Thermistors>,
    pub power: Arc<dyn PowerSwitch>,
}

impl Instrument {
    /// Use one simulated instrument for every sub-system.
    pub fn simulated(sim: Arc<SimInstrument>) -> Self {
        Self {
            detector: sim.clone(),
            analog: sim.clone(),
            thermistors: sim.clone(),
            power: sim,
        }
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("mode", &self.detector.instrument_mode())
            .finish_non_exhaustive()
    }
}
