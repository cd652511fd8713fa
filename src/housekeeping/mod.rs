// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Background housekeeping collectors.
//!
//! - [`light`] - Analog board polling and day/night classification
//! - [`thermal`] - Thermistor bus polling and `digitemp` output parsing
//!
//! Collectors only log what they read. Each runs on its own thread and is
//! stopped through its [`CollectorHandle`].

pub mod light;
pub mod thermal;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::control::Signal;
use crate::core::{AcqError, Result};

pub use light::{LightCondition, LightMonitor};
pub use thermal::{DigitempParser, ThermReading, ThermalMonitor};

/// A running collector thread.
#[derive(Debug)]
pub struct CollectorHandle {
    name: &'static str,
    stop: Arc<Signal>,
    handle: JoinHandle<u64>,
}

impl CollectorHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the collector and wait for it. Returns the number of polls
    /// it completed.
    pub fn stop(self) -> u64 {
        self.stop.raise();
        match self.handle.join() {
            Ok(polls) => {
                debug!(collector = self.name, polls, "Collector stopped");
                polls
            }
            Err(_) => {
                warn!(collector = self.name, "Collector thread panicked");
                0
            }
        }
    }
}

/// Run `poll` every `interval` until stopped.
///
/// The first poll happens immediately.
fn spawn_collector<F>(name: &'static str, interval: Duration, mut poll: F) -> Result<CollectorHandle>
where
    F: FnMut() + Send + 'static,
{
    let stop = Arc::new(Signal::new());
    let thread_stop = Arc::clone(&stop);
    let handle = std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let mut polls = 0;
            loop {
                poll();
                polls += 1;
                if thread_stop.wait_timeout(interval) {
                    break polls;
                }
            }
        })
        .map_err(|e| AcqError::io(format!("spawning {name} collector"), e))?;
    Ok(CollectorHandle { name, stop, handle })
}
