// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Thermistor monitoring.
//!
//! The bus reader prints one line per sensor in `digitemp` style:
//!
//! ```text
//! Oct 18 10:02:11 Sensor 0 C: 21.50 F: 70.70
//! ```

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{AcqError, Result};
use crate::hardware::Thermistors;

use super::{spawn_collector, CollectorHandle};

const READING_PATTERN: &str =
    r"(?:Sensor\s+(\d+)\s+)?C:\s*(-?\d+\.\d{2})\s+F:\s*(-?\d+\.\d{2})";

/// One sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermReading {
    /// Sensor index; the line position when the output omits it
    pub sensor: usize,
    pub celsius: f32,
    pub fahrenheit: f32,
}

/// Extracts readings from raw `digitemp` output.
#[derive(Debug, Clone)]
pub struct DigitempParser {
    pattern: Regex,
}

impl DigitempParser {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(READING_PATTERN)
            .map_err(|e| AcqError::config(format!("thermistor pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// Lines without a reading are ignored.
    pub fn parse(&self, text: &str) -> Vec<ThermReading> {
        self.pattern
            .captures_iter(text)
            .enumerate()
            .filter_map(|(position, caps)| {
                let sensor = match caps.get(1) {
                    Some(m) => m.as_str().parse().ok()?,
                    None => position,
                };
                Some(ThermReading {
                    sensor,
                    celsius: caps[2].parse().ok()?,
                    fahrenheit: caps[3].parse().ok()?,
                })
            })
            .collect()
    }
}

/// Polls the thermistor bus and logs the readings.
#[derive(Clone)]
pub struct ThermalMonitor {
    bus: Arc<dyn Thermistors>,
    parser: DigitempParser,
    poll: Duration,
}

impl ThermalMonitor {
    pub fn new(bus: Arc<dyn Thermistors>, poll: Duration) -> Result<Self> {
        Ok(Self {
            bus,
            parser: DigitempParser::new()?,
            poll,
        })
    }

    pub fn sample(&self) -> Vec<ThermReading> {
        let raw = match self.bus.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(fields = ?e.log_fields(), "Thermistor read failed");
                return Vec::new();
            }
        };
        let readings = self.parser.parse(&raw);
        if readings.is_empty() {
            warn!(bytes = raw.len(), "No thermistor readings in output");
        }
        for r in &readings {
            info!(sensor = r.sensor, celsius = r.celsius, "Temperature");
        }
        readings
    }

    pub fn spawn(self) -> Result<CollectorHandle> {
        let poll = self.poll;
        spawn_collector("thermal-monitor", poll, move || {
            self.sample();
        })
    }
}
