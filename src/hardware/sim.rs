// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Simulated instrument.
//!
//! [`SimInstrument`] implements every capability trait and deposits sensor
//! files into the data directory the way the flight sub-systems do:
//!
//! - `frm_cc_XXXXXXXX.dat` while in [`InstrumentMode::Acquire`]
//! - `sc_XXXXXXXX.dat` for each S-curve scan
//! - `hv_XXXXXXXX.dat` on request
//!
//! Files are assembled in a staging directory and renamed into place, so a
//! watcher never sees a partially written file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::control::Signal;
use crate::core::{AcqError, Result};
use crate::format::{LightLevels, RecordLayout, ScurveParams};

use super::traits::{
    AnalogBoard, DetectorBoard, InstrumentMode, PowerStatus, PowerSwitch, SubSystem, Thermistors,
};

const STAGING_DIR: &str = ".staging";

/// Writes simulated sensor output files.
#[derive(Debug, Clone)]
pub struct SimFiles {
    data_dir: PathBuf,
    staging: PathBuf,
    layout: RecordLayout,
    counter: Arc<AtomicU32>,
}

impl SimFiles {
    pub fn new(data_dir: impl Into<PathBuf>, layout: RecordLayout) -> Self {
        let data_dir = data_dir.into();
        let staging = data_dir.join(STAGING_DIR);
        Self {
            data_dir,
            staging,
            layout,
            counter: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn publish(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging)
            .map_err(|e| AcqError::io(format!("creating {}", self.staging.display()), e))?;
        let staged = self.staging.join(name);
        fs::write(&staged, contents)
            .map_err(|e| AcqError::io(format!("writing {}", staged.display()), e))?;
        let target = self.data_dir.join(name);
        fs::rename(&staged, &target)
            .map_err(|e| AcqError::io(format!("publishing {}", target.display()), e))?;
        debug!(file = %target.display(), bytes = contents.len(), "Simulated output");
        Ok(target)
    }

    fn next_index(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    fn pattern(len: usize, seed: u32) -> Vec<u8> {
        (0..len).map(|i| (i as u32).wrapping_add(seed) as u8).collect()
    }

    /// Deposit one detector frame file.
    pub fn write_frame(&self, n1: u32, n2: u32) -> Result<PathBuf> {
        let index = self.next_index();
        let data = Self::pattern(self.layout.frame_len(n1, n2), index);
        self.publish(&format!("frm_cc_{index:08}.dat"), &data)
    }

    pub fn write_scurve(&self) -> Result<PathBuf> {
        let index = self.next_index();
        let data = Self::pattern(self.layout.scurve_len as usize, index);
        self.publish(&format!("sc_{index:08}.dat"), &data)
    }

    pub fn write_hv(&self) -> Result<PathBuf> {
        let index = self.next_index();
        let data = Self::pattern(self.layout.hv_log_len as usize, index);
        self.publish(&format!("hv_{index:08}.dat"), &data)
    }
}

struct Producer {
    stop: Arc<Signal>,
    handle: JoinHandle<u32>,
}

struct DetectorState {
    n1: u32,
    n2: u32,
    test_mode: bool,
    mode: InstrumentMode,
    producer: Option<Producer>,
}

/// A complete simulated instrument.
pub struct SimInstrument {
    files: SimFiles,
    frame_period: Duration,
    frame_limit: Option<u32>,
    detector: Mutex<DetectorState>,
    power: Mutex<BTreeMap<SubSystem, PowerStatus>>,
    light: Mutex<LightLevels>,
    fail_light_reads: AtomicBool,
}

impl SimInstrument {
    pub fn new(data_dir: impl Into<PathBuf>, layout: RecordLayout) -> Self {
        let mut light = LightLevels::default();
        light.photodiode = [800.0, 820.0, 790.0, 810.0];
        light.sipm = [12.5; 64];
        light.sipm_single = 3.25;

        Self {
            files: SimFiles::new(data_dir, layout),
            frame_period: Duration::from_millis(500),
            frame_limit: None,
            detector: Mutex::new(DetectorState {
                n1: 4,
                n2: 4,
                test_mode: false,
                mode: InstrumentMode::Mode0,
                producer: None,
            }),
            power: Mutex::new(
                SubSystem::ALL
                    .into_iter()
                    .map(|s| (s, PowerStatus::Off))
                    .collect(),
            ),
            light: Mutex::new(light),
            fail_light_reads: AtomicBool::new(false),
        }
    }

    /// Interval between frame files in acquire mode.
    pub fn with_frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period;
        self
    }

    /// Stop producing frames after this many per acquire session.
    pub fn with_frame_limit(mut self, limit: Option<u32>) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn files(&self) -> &SimFiles {
        &self.files
    }

    pub fn set_light_levels(&self, levels: LightLevels) {
        *self.light.lock().unwrap_or_else(|e| e.into_inner()) = levels;
    }

    /// Make subsequent light reads fail.
    pub fn fail_light_reads(&self, fail: bool) {
        self.fail_light_reads.store(fail, Ordering::SeqCst);
    }

    pub fn test_mode(&self) -> bool {
        self.detector().test_mode
    }

    pub fn n_pkts(&self) -> (u32, u32) {
        let state = self.detector();
        (state.n1, state.n2)
    }

    fn detector(&self) -> MutexGuard<'_, DetectorState> {
        self.detector.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start_producer(&self, state: &mut DetectorState) -> Result<()> {
        let stop = Arc::new(Signal::new());
        let thread_stop = Arc::clone(&stop);
        let files = self.files.clone();
        let (n1, n2) = (state.n1, state.n2);
        let period = self.frame_period;
        let limit = self.frame_limit;

        let handle = std::thread::Builder::new()
            .name("sim-frames".into())
            .spawn(move || {
                let mut produced = 0;
                while limit.map_or(true, |l| produced < l) {
                    if thread_stop.wait_timeout(period) {
                        break;
                    }
                    match files.write_frame(n1, n2) {
                        Ok(_) => produced += 1,
                        Err(e) => {
                            warn!(error = %e, "Simulated frame write failed");
                            break;
                        }
                    }
                }
                produced
            })
            .map_err(|e| AcqError::io("spawning simulated frame producer", e))?;

        state.producer = Some(Producer { stop, handle });
        Ok(())
    }

    fn stop_producer(state: &mut DetectorState) {
        if let Some(producer) = state.producer.take() {
            producer.stop.raise();
            match producer.handle.join() {
                Ok(produced) => info!(frames = produced, "Simulated frame producer stopped"),
                Err(_) => warn!("Simulated frame producer panicked"),
            }
        }
    }
}

impl DetectorBoard for SimInstrument {
    fn set_n_pkts(&self, n1: u32, n2: u32) -> Result<()> {
        let mut state = self.detector();
        state.n1 = n1;
        state.n2 = n2;
        Ok(())
    }

    fn set_test_mode(&self, enabled: bool) -> Result<()> {
        self.detector().test_mode = enabled;
        Ok(())
    }

    fn set_instrument_mode(&self, mode: InstrumentMode) -> Result<()> {
        let mut state = self.detector();
        Self::stop_producer(&mut state);
        state.mode = mode;
        if mode == InstrumentMode::Acquire {
            self.start_producer(&mut state)?;
        }
        debug!(mode = ?mode, "Simulated instrument mode set");
        Ok(())
    }

    fn instrument_mode(&self) -> InstrumentMode {
        self.detector().mode
    }

    fn scurve(&self, params: &ScurveParams) -> Result<()> {
        if params.step == 0 {
            return Err(AcqError::hardware("DetectorBoard", "scan step must be positive"));
        }
        {
            let mut state = self.detector();
            Self::stop_producer(&mut state);
            state.mode = InstrumentMode::Scurve;
        }
        let result = self.files.write_scurve();
        self.detector().mode = InstrumentMode::Mode0;
        result.map(|_| ())
    }
}

impl AnalogBoard for SimInstrument {
    fn read_light_levels(&self) -> Result<LightLevels> {
        if self.fail_light_reads.load(Ordering::SeqCst) {
            return Err(AcqError::hardware("AnalogBoard", "no response from board"));
        }
        Ok(*self.light.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Thermistors for SimInstrument {
    fn read_raw(&self) -> Result<String> {
        let stamp = chrono::Utc::now().format("%b %d %H:%M:%S");
        Ok((0..4)
            .map(|i| {
                let celsius = 21.5 + i as f32 * 0.75;
                let fahrenheit = celsius * 9.0 / 5.0 + 32.0;
                format!("{stamp} Sensor {i} C: {celsius:.2} F: {fahrenheit:.2}\n")
            })
            .collect())
    }
}

impl PowerSwitch for SimInstrument {
    fn switch_on(&self, subsystem: SubSystem) -> Result<()> {
        self.power
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subsystem, PowerStatus::On);
        Ok(())
    }

    fn switch_off(&self, subsystem: SubSystem) -> Result<()> {
        self.power
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subsystem, PowerStatus::Off);
        Ok(())
    }

    fn status(&self, subsystem: SubSystem) -> Result<PowerStatus> {
        Ok(self
            .power
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&subsystem)
            .copied()
            .unwrap_or(PowerStatus::Off))
    }
}

impl Drop for SimInstrument {
    fn drop(&mut self) {
        let state = self.detector.get_mut().unwrap_or_else(|e| e.into_inner());
        Self::stop_producer(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DetectorFrame;

    fn layout() -> RecordLayout {
        RecordLayout {
            l1_size: 4,
            l2_size: 8,
            l3_size: 16,
            scurve_len: 32,
            hv_log_len: 8,
        }
    }

    #[test]
    fn test_files_are_named_and_sized() {
        let dir = tempfile::tempdir().unwrap();
        let files = SimFiles::new(dir.path(), layout());

        let frame = files.write_frame(2, 1).unwrap();
        assert!(frame.ends_with("frm_cc_00000000.dat"));
        assert!(DetectorFrame::read(&frame, 2, 1, &layout()).is_ok());

        let sc = files.write_scurve().unwrap();
        assert!(sc.ends_with("sc_00000001.dat"));
        assert_eq!(fs::metadata(&sc).unwrap().len(), 32);

        let hv = files.write_hv().unwrap();
        assert!(hv.ends_with("hv_00000002.dat"));
        assert!(!dir.path().join(STAGING_DIR).join("hv_00000002.dat").exists());
    }

    #[test]
    fn test_acquire_mode_produces_frames() {
        let dir = tempfile::tempdir().unwrap();
        let sim = SimInstrument::new(dir.path(), layout())
            .with_frame_period(Duration::from_millis(5))
            .with_frame_limit(Some(3));
        sim.set_n_pkts(1, 1).unwrap();
        sim.set_instrument_mode(InstrumentMode::Acquire).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        sim.set_instrument_mode(InstrumentMode::Mode0).unwrap();

        let frames = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("frm"))
            .count();
        assert_eq!(frames, 3);
    }

    #[test]
    fn test_scurve_returns_to_mode0() {
        let dir = tempfile::tempdir().unwrap();
        let sim = SimInstrument::new(dir.path(), layout());
        sim.scurve(&ScurveParams {
            start: 0,
            step: 1,
            stop: 10,
            acc: 1,
        })
        .unwrap();
        assert_eq!(sim.instrument_mode(), InstrumentMode::Mode0);
        assert!(sim.scurve(&ScurveParams::default()).is_err());
    }

    #[test]
    fn test_light_failure_injection() {
        let dir = tempfile::tempdir().unwrap();
        let sim = SimInstrument::new(dir.path(), layout());
        assert!(sim.read_light_levels().is_ok());
        sim.fail_light_reads(true);
        assert!(sim.read_light_levels().unwrap_err().is_skippable());
    }

    #[test]
    fn test_power_switching() {
        let dir = tempfile::tempdir().unwrap();
        let sim = SimInstrument::new(dir.path(), layout());
        assert_eq!(sim.status(SubSystem::HighVoltage).unwrap(), PowerStatus::Off);
        sim.switch_on(SubSystem::HighVoltage).unwrap();
        assert_eq!(sim.status(SubSystem::HighVoltage).unwrap(), PowerStatus::On);
        sim.switch_off(SubSystem::HighVoltage).unwrap();
        assert_eq!(sim.status(SubSystem::HighVoltage).unwrap(), PowerStatus::Off);
    }
}
