// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Acquire command - run a collection session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use tracing::info;

use crate::common::Result;
use cpudaq::hardware::{Instrument, SimInstrument};
use cpudaq::{Acquisition, Config};

/// Run an acquisition session.
#[derive(Args, Clone, Debug)]
pub struct AcquireCmd {
    /// Local configuration file
    #[arg(short, long, value_name = "TOML")]
    config: PathBuf,

    /// Override files; the first one that exists is layered on top
    #[arg(long = "override", value_name = "TOML")]
    overrides: Vec<PathBuf>,

    /// Run one S-curve scan instead of collecting frames
    #[arg(long)]
    scurve: bool,

    /// Drive a simulated instrument
    #[arg(long)]
    simulate: bool,

    /// Stop the simulated detector after this many frames
    #[arg(long, value_name = "N", requires = "simulate")]
    frames: Option<u32>,

    /// Interval between simulated frames
    #[arg(long, value_name = "MS", default_value_t = 500, requires = "simulate")]
    frame_period_ms: u64,
}

impl AcquireCmd {
    pub fn run(self) -> Result<()> {
        let config = Config::load(&self.config, &self.overrides)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if !self.simulate {
            bail!("no hardware backend is available in this build; pass --simulate");
        }
        let sim = SimInstrument::new(&config.paths.data_dir, config.layout)
            .with_frame_period(Duration::from_millis(self.frame_period_ms))
            .with_frame_limit(self.frames);
        let instrument = Instrument::simulated(Arc::new(sim));

        let acquisition = Acquisition::new(config, instrument)?;
        let switch = acquisition.switch();
        ctrlc::set_handler(move || switch.raise()).context("installing signal handler")?;

        let report = if self.scurve {
            acquisition.collect_scurve()
        } else {
            acquisition.collect_data()
        };
        let closed = acquisition.shutdown();
        let report = report?;

        info!(outcome = ?report.outcome, runs_closed = closed.len(), "Session finished");
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
