// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Acquisition configuration.
//!
//! Configuration is read from TOML. A local file is read first, then the
//! first override file that exists (typically on removable storage) is
//! layered on top of it, field by field.
//!
//! The file model ([`ConfigFile`]) keeps every required field optional so
//! that layering can tell "absent" from "set". [`ConfigFile::validate`]
//! turns it into a [`Config`] or fails naming every missing field.
//!
//! ```toml
//! [acquisition]
//! run_size = 25
//! n1 = 4
//! n2 = 4
//!
//! [scurve]
//! start = 0
//! step = 1
//! stop = 1023
//! acc = 1
//! dynode_voltage = 950
//!
//! [paths]
//! data_dir = "/home/software/CPU/FTP"
//! done_dir = "/home/software/CPU/DONE"
//!
//! [housekeeping]
//! light_poll_ms = 60000
//! day_light_threshold = 1200.0
//! night_light_threshold = 300.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::core::{AcqError, Result};
use crate::format::{RecordLayout, ScurveParams};

/// `[acquisition]` section as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionSection {
    pub run_size: Option<u32>,
    pub n1: Option<u32>,
    pub n2: Option<u32>,
    pub keep_inputs: Option<bool>,
    pub single_run: Option<bool>,
    pub tolerate_first_packet_failure: Option<bool>,
    pub test_mode: Option<bool>,
}

/// `[scurve]` section as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScurveSection {
    pub start: Option<u32>,
    pub step: Option<u32>,
    pub stop: Option<u32>,
    pub acc: Option<u32>,
    pub dynode_voltage: Option<u32>,
}

/// `[paths]` section as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub data_dir: Option<PathBuf>,
    pub done_dir: Option<PathBuf>,
    pub usb_mountpoints: Option<Vec<PathBuf>>,
}

/// `[ingest]` section as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSection {
    pub poll_ms: Option<u64>,
    pub frame_settle_ms: Option<u64>,
    pub scurve_settle_ms: Option<u64>,
    pub hv_settle_ms: Option<u64>,
}

/// `[housekeeping]` section as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HousekeepingSection {
    pub light_poll_ms: Option<u64>,
    pub day_light_threshold: Option<f32>,
    pub night_light_threshold: Option<f32>,
    pub therm_on: Option<bool>,
    pub therm_poll_ms: Option<u64>,
}

/// One configuration file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub acquisition: AcquisitionSection,
    pub scurve: ScurveSection,
    pub paths: PathsSection,
    pub ingest: IngestSection,
    pub layout: Option<RecordLayout>,
    pub housekeeping: HousekeepingSection,
}

/// Replace each field of `base` that `over` sets.
macro_rules! overlay {
    ($base:expr, $over:expr, $($field:ident),+ $(,)?) => {
        $(
            if $over.$field.is_some() {
                $base.$field = $over.$field;
            }
        )+
    };
}

impl ConfigFile {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AcqError::config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AcqError::io(format!("reading {}", path.display()), e))?;
        Self::from_toml_str(&text)
            .map_err(|e| AcqError::config(format!("{}: {e}", path.display())))
    }

    /// Layer `over` on top of `self`.
    pub fn merge(mut self, over: ConfigFile) -> Self {
        overlay!(
            self.acquisition,
            over.acquisition,
            run_size,
            n1,
            n2,
            keep_inputs,
            single_run,
            tolerate_first_packet_failure,
            test_mode,
        );
        overlay!(self.scurve, over.scurve, start, step, stop, acc, dynode_voltage);
        overlay!(self.paths, over.paths, data_dir, done_dir, usb_mountpoints);
        overlay!(
            self.ingest,
            over.ingest,
            poll_ms,
            frame_settle_ms,
            scurve_settle_ms,
            hv_settle_ms,
        );
        overlay!(
            self.housekeeping,
            over.housekeeping,
            light_poll_ms,
            day_light_threshold,
            night_light_threshold,
            therm_on,
            therm_poll_ms,
        );
        if over.layout.is_some() {
            self.layout = over.layout;
        }
        self
    }

    /// Check required fields and ranges.
    ///
    /// # Errors
    ///
    /// [`AcqError::Config`] listing every missing field, or the first
    /// out-of-range value.
    pub fn validate(self) -> Result<Config> {
        let file = &self;
        let mut missing = Vec::new();
        macro_rules! require {
            ($section:ident . $field:ident) => {
                match file.$section.$field.clone() {
                    Some(value) => value,
                    None => {
                        missing.push(concat!(stringify!($section), ".", stringify!($field)));
                        Default::default()
                    }
                }
            };
        }

        let run_size: u32 = require!(acquisition.run_size);
        let n1: u32 = require!(acquisition.n1);
        let n2: u32 = require!(acquisition.n2);
        let start: u32 = require!(scurve.start);
        let step: u32 = require!(scurve.step);
        let stop: u32 = require!(scurve.stop);
        let acc: u32 = require!(scurve.acc);
        let dynode_voltage: u32 = require!(scurve.dynode_voltage);
        let data_dir: PathBuf = require!(paths.data_dir);
        let done_dir: PathBuf = require!(paths.done_dir);
        let light_poll_ms: u64 = require!(housekeeping.light_poll_ms);
        let day_light_threshold: f32 = require!(housekeeping.day_light_threshold);
        let night_light_threshold: f32 = require!(housekeeping.night_light_threshold);

        if !missing.is_empty() {
            return Err(AcqError::config(format!(
                "missing fields: {}",
                missing.join(", ")
            )));
        }

        if run_size == 0 {
            return Err(AcqError::config("acquisition.run_size must be positive"));
        }
        if step == 0 || start > stop {
            return Err(AcqError::config(format!(
                "invalid scurve range start={start} step={step} stop={stop}"
            )));
        }
        if night_light_threshold > day_light_threshold {
            return Err(AcqError::config(format!(
                "night_light_threshold {night_light_threshold} exceeds day_light_threshold {day_light_threshold}"
            )));
        }
        let layout = self.layout.unwrap_or_default();
        if layout.l3_size == 0 {
            return Err(AcqError::config("layout.l3_size must be positive"));
        }
        // Packet sizes are stored as u32.
        let main_len = layout.main_packet_len(0, 0) as u128
            + u128::from(n1) * u128::from(layout.l1_size)
            + u128::from(n2) * u128::from(layout.l2_size);
        let largest = main_len
            .max(layout.scurve_packet_len() as u128)
            .max(layout.hv_packet_len() as u128);
        if largest > u128::from(u32::MAX) {
            return Err(AcqError::config(format!(
                "packet of {largest} bytes exceeds the u32 size field (n1={n1}, n2={n2})"
            )));
        }

        let ms = Duration::from_millis;
        Ok(Config {
            acquisition: AcquisitionConfig {
                run_size,
                n1,
                n2,
                keep_inputs: self.acquisition.keep_inputs.unwrap_or(false),
                single_run: self.acquisition.single_run.unwrap_or(false),
                tolerate_first_packet_failure: self
                    .acquisition
                    .tolerate_first_packet_failure
                    .unwrap_or(false),
                test_mode: self.acquisition.test_mode.unwrap_or(false),
            },
            scurve: ScurveConfig {
                params: ScurveParams {
                    start,
                    step,
                    stop,
                    acc,
                },
                dynode_voltage,
            },
            paths: PathsConfig {
                data_dir,
                done_dir,
                usb_mountpoints: self.paths.usb_mountpoints.unwrap_or_default(),
            },
            ingest: IngestConfig {
                poll: ms(self.ingest.poll_ms.unwrap_or(100)),
                frame_settle: ms(self.ingest.frame_settle_ms.unwrap_or(2_000)),
                scurve_settle: ms(self.ingest.scurve_settle_ms.unwrap_or(27_000)),
                hv_settle: ms(self.ingest.hv_settle_ms.unwrap_or(1_000)),
            },
            layout,
            housekeeping: HousekeepingConfig {
                light_poll: ms(light_poll_ms),
                day_light_threshold,
                night_light_threshold,
                therm_on: self.housekeeping.therm_on.unwrap_or(false),
                therm_poll: ms(self.housekeeping.therm_poll_ms.unwrap_or(60_000)),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Packets per MAIN run file before rotation
    pub run_size: u32,
    pub n1: u32,
    pub n2: u32,
    /// Leave sensor files in place after ingesting them
    pub keep_inputs: bool,
    /// Stop after the first MAIN run fills up
    pub single_run: bool,
    /// Write the first MAIN packet of a run even if an input failed
    pub tolerate_first_packet_failure: bool,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScurveConfig {
    pub params: ScurveParams,
    pub dynode_voltage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    /// Directory the sensor sub-systems deposit files into
    pub data_dir: PathBuf,
    /// Run file destination when no removable storage is usable
    pub done_dir: PathBuf,
    pub usb_mountpoints: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Event poll interval; bounds the latency of a mode switch
    pub poll: Duration,
    pub frame_settle: Duration,
    pub scurve_settle: Duration,
    pub hv_settle: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HousekeepingConfig {
    pub light_poll: Duration,
    pub day_light_threshold: f32,
    pub night_light_threshold: f32,
    pub therm_on: bool,
    pub therm_poll: Duration,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub acquisition: AcquisitionConfig,
    pub scurve: ScurveConfig,
    pub paths: PathsConfig,
    pub ingest: IngestConfig,
    pub layout: RecordLayout,
    pub housekeeping: HousekeepingConfig,
}

impl Config {
    /// Parse and validate a single TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        ConfigFile::from_toml_str(text)?.validate()
    }

    /// Load `local`, layer the first existing `overrides` entry on top,
    /// and validate.
    pub fn load(local: impl AsRef<Path>, overrides: &[PathBuf]) -> Result<Self> {
        let local = local.as_ref();
        let mut file = ConfigFile::from_path(local)?;
        debug!(path = %local.display(), "Read local configuration");

        if let Some(path) = overrides.iter().find(|p| p.is_file()) {
            info!(path = %path.display(), "Applying configuration override");
            file = file.merge(ConfigFile::from_path(path)?);
        }
        file.validate()
    }
}
