// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Light level monitoring.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::HousekeepingConfig;
use crate::core::Result;
use crate::hardware::AnalogBoard;

use super::{spawn_collector, CollectorHandle};

/// Ambient light regime derived from the mean photodiode level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LightCondition {
    Day,
    Twilight,
    Night,
}

/// Polls the analog board and logs the light regime.
#[derive(Clone)]
pub struct LightMonitor {
    analog: Arc<dyn AnalogBoard>,
    poll: Duration,
    day_threshold: f32,
    night_threshold: f32,
}

impl LightMonitor {
    pub fn new(analog: Arc<dyn AnalogBoard>, config: &HousekeepingConfig) -> Self {
        Self {
            analog,
            poll: config.light_poll,
            day_threshold: config.day_light_threshold,
            night_threshold: config.night_light_threshold,
        }
    }

    /// Above the day threshold is day, below the night threshold is night.
    pub fn classify(&self, mean: f32) -> LightCondition {
        if mean > self.day_threshold {
            LightCondition::Day
        } else if mean < self.night_threshold {
            LightCondition::Night
        } else {
            LightCondition::Twilight
        }
    }

    /// Take one reading. `None` if the board did not answer.
    pub fn sample(&self) -> Option<(f32, LightCondition)> {
        match self.analog.read_light_levels() {
            Ok(levels) => {
                let mean = levels.photodiode_mean();
                let condition = self.classify(mean);
                info!(photodiode_mean = mean, condition = ?condition, "Light level");
                Some((mean, condition))
            }
            Err(e) => {
                warn!(fields = ?e.log_fields(), "Light level read failed");
                None
            }
        }
    }

    pub fn spawn(self) -> Result<CollectorHandle> {
        let poll = self.poll;
        spawn_collector("light-monitor", poll, move || {
            self.sample();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{LightLevels, RecordLayout};
    use crate::hardware::SimInstrument;

    fn monitor(sim: Arc<SimInstrument>) -> LightMonitor {
        LightMonitor::new(
            sim,
            &HousekeepingConfig {
                light_poll: Duration::from_millis(5),
                day_light_threshold: 500.0,
                night_light_threshold: 100.0,
                therm_on: false,
                therm_poll: Duration::from_secs(1),
            },
        )
    }

    #[test]
    fn test_classify_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(Arc::new(SimInstrument::new(dir.path(), RecordLayout::default())));
        assert_eq!(monitor.classify(800.0), LightCondition::Day);
        assert_eq!(monitor.classify(500.0), LightCondition::Twilight);
        assert_eq!(monitor.classify(100.0), LightCondition::Twilight);
        assert_eq!(monitor.classify(20.0), LightCondition::Night);
    }

    #[test]
    fn test_sample_reads_board() {
        let dir = tempfile::tempdir().unwrap();
        let sim = Arc::new(SimInstrument::new(dir.path(), RecordLayout::default()));
        let monitor = monitor(Arc::clone(&sim));

        let mut dark = LightLevels::default();
        dark.photodiode = [10.0, 20.0, 30.0, 40.0];
        sim.set_light_levels(dark);
        assert_eq!(monitor.sample(), Some((25.0, LightCondition::Night)));

        sim.fail_light_reads(true);
        assert_eq!(monitor.sample(), None);
        assert!(monitor.spawn().unwrap().stop() >= 1);
    }
}
