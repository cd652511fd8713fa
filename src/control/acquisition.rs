// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Acquisition sessions.
//!
//! An [`Acquisition`] owns the run manager and the mode switch and drives
//! one collection at a time:
//!
//! - [`Acquisition::collect_data`] - MAIN runs from detector frames, with
//!   housekeeping collectors alongside
//! - [`Acquisition::collect_scurve`] - one S-curve scan into an SC run
//!
//! The directory watch is established on the calling thread before the
//! instrument is touched, so a watch failure aborts the session before any
//! run file exists.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::{AcqError, Result, RunType};
use crate::hardware::{Instrument, InstrumentMode, SubSystem};
use crate::housekeeping::{CollectorHandle, LightMonitor, ThermalMonitor};
use crate::ingest::{
    DirectoryWatcher, IngestOptions, IngestOutcome, IngestPipeline, IngestReport, IngestStats,
};
use crate::run::{RunManager, RunSummary};
use crate::storage::{BackupTask, StorageSelector};

use super::signal::Signal;
use super::state::RunState;

/// Interval between backup passes while collecting.
pub const BACKUP_INTERVAL: Duration = Duration::from_secs(60);

/// Drives collection sessions against one instrument.
pub struct Acquisition {
    config: Config,
    instrument: Instrument,
    manager: Arc<RunManager>,
    switch: Arc<Signal>,
    state: Mutex<RunState>,
    /// Notified when a session leaves `Running`
    session_ended: Condvar,
}

impl Acquisition {
    /// Prepare a controller. Creates the data and done directories if
    /// they are missing.
    pub fn new(config: Config, instrument: Instrument) -> Result<Self> {
        for dir in [&config.paths.data_dir, &config.paths.done_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| AcqError::io(format!("creating {}", dir.display()), e))?;
        }
        let manager = Arc::new(RunManager::from_config(&config));
        info!(
            data_dir = %config.paths.data_dir.display(),
            done_dir = %config.paths.done_dir.display(),
            run_size = config.acquisition.run_size,
            "Acquisition ready"
        );
        Ok(Self {
            config,
            instrument,
            manager,
            switch: Arc::new(Signal::new()),
            state: Mutex::new(RunState::Idle),
            session_ended: Condvar::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &Arc<RunManager> {
        &self.manager
    }

    /// The mode switch, for signal handlers and other threads.
    pub fn switch(&self) -> Arc<Signal> {
        Arc::clone(&self.switch)
    }

    pub fn state(&self) -> RunState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask the running collection to stop.
    pub fn request_switch(&self) {
        info!(state = %self.state(), "Mode switch requested");
        self.switch.raise();
    }

    /// Stop any collection, close every open run and power down.
    ///
    /// Blocks until a running session has returned the instrument to
    /// mode 0 and closed its run. No collection can be started afterwards.
    pub fn shutdown(&self) -> Vec<RunSummary> {
        let mut state = self.lock_state();
        while let Some(run_type) = state.run_type() {
            info!(run_type = %run_type, "Waiting for session to stop");
            self.switch.raise();
            state = self
                .session_ended
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        *state = RunState::Stopped;
        drop(state);
        self.switch.raise();
        let closed = self.manager.close_all();
        for subsystem in SubSystem::ALL {
            if let Err(e) = self.instrument.power.switch_off(subsystem) {
                warn!(subsystem = ?subsystem, fields = ?e.log_fields(), "Power off failed");
            }
        }
        info!(runs_closed = closed.len(), "Acquisition shut down");
        closed
    }

    /// Record detector frames into MAIN runs until the pipeline stops.
    ///
    /// Runs the pipeline, the light and thermal collectors and, with two
    /// storage devices present, the backup task. On return the instrument
    /// is back in mode 0 and no MAIN run is open.
    pub fn collect_data(&self) -> Result<IngestReport> {
        if !self.begin(RunType::Main, "collect data")? {
            return Ok(cancelled());
        }
        let result = self.run_data_session();
        self.end();
        result
    }

    /// Run one S-curve scan and record its output.
    pub fn collect_scurve(&self) -> Result<IngestReport> {
        if !self.begin(RunType::Scurve, "collect S-curve")? {
            return Ok(cancelled());
        }
        let result = self.run_scurve_session();
        self.end();
        result
    }

    /// Claim the controller. `false` if a switch is already pending.
    fn begin(&self, run_type: RunType, action: &'static str) -> Result<bool> {
        let mut state = self.lock_state();
        if !state.can_start() {
            return Err(AcqError::Busy {
                action,
                state: state.to_string(),
            });
        }
        if self.switch.is_raised() {
            debug!(action, "Mode switch pending, not starting");
            self.switch.clear();
            return Ok(false);
        }
        *state = RunState::Running(run_type);
        Ok(true)
    }

    fn end(&self) {
        let mut state = self.lock_state();
        if *state != RunState::Stopped {
            *state = RunState::Idle;
            self.switch.clear();
        }
        self.session_ended.notify_all();
    }

    fn power_up(&self, subsystems: &[SubSystem]) -> Result<()> {
        for &subsystem in subsystems {
            self.instrument.power.switch_on(subsystem)?;
            let status = self.instrument.power.status(subsystem)?;
            debug!(subsystem = ?subsystem, status = ?status, "Sub-system powered");
        }
        Ok(())
    }

    fn spawn_pipeline(
        &self,
        watcher: DirectoryWatcher,
    ) -> Result<JoinHandle<Result<IngestReport>>> {
        let pipeline = IngestPipeline::new(
            watcher,
            Arc::clone(&self.manager),
            Arc::clone(&self.instrument.analog),
            Arc::clone(&self.switch),
            IngestOptions::from_config(&self.config),
        );
        std::thread::Builder::new()
            .name("ingest".into())
            .spawn(move || pipeline.run())
            .map_err(|e| AcqError::io("spawning ingest thread", e))
    }

    fn run_data_session(&self) -> Result<IngestReport> {
        let acquisition = &self.config.acquisition;
        let mut subsystems = vec![SubSystem::DetectorBoard, SubSystem::AnalogBoard];
        if self.config.housekeeping.therm_on {
            subsystems.push(SubSystem::Thermistors);
        }
        let watcher = DirectoryWatcher::new(&self.config.paths.data_dir)?;
        self.power_up(&subsystems)?;
        let pipeline = self.spawn_pipeline(watcher)?;

        let detector = &self.instrument.detector;
        let started = detector
            .set_n_pkts(acquisition.n1, acquisition.n2)
            .and_then(|_| detector.set_test_mode(acquisition.test_mode))
            .and_then(|_| detector.set_instrument_mode(InstrumentMode::Acquire))
            .and_then(|_| self.start_collectors());

        let (collectors, backup) = match started {
            Ok(handles) => handles,
            Err(e) => {
                warn!(fields = ?e.log_fields(), "Failed to start acquisition");
                self.switch.raise();
                let _ = join(pipeline);
                self.stop_instrument();
                self.close_main();
                return Err(e);
            }
        };
        info!(
            n1 = acquisition.n1,
            n2 = acquisition.n2,
            test_mode = acquisition.test_mode,
            "Acquiring data"
        );

        let report = join(pipeline);
        for collector in collectors {
            collector.stop();
        }
        if let Some(backup) = backup {
            info!(files = backup.stop(), "Backup stopped");
        }
        self.stop_instrument();
        self.close_main();
        report
    }

    fn start_collectors(&self) -> Result<(Vec<CollectorHandle>, Option<BackupTask>)> {
        let housekeeping = &self.config.housekeeping;
        let mut collectors =
            vec![LightMonitor::new(Arc::clone(&self.instrument.analog), housekeeping).spawn()?];
        if housekeeping.therm_on {
            let thermal = ThermalMonitor::new(
                Arc::clone(&self.instrument.thermistors),
                housekeeping.therm_poll,
            )
            .and_then(ThermalMonitor::spawn);
            match thermal {
                Ok(handle) => collectors.push(handle),
                Err(e) => {
                    for collector in collectors {
                        collector.stop();
                    }
                    return Err(e);
                }
            }
        }

        let storage = StorageSelector::new(
            self.config.paths.usb_mountpoints.clone(),
            self.config.paths.done_dir.clone(),
        );
        let backup = match storage.backup_pair() {
            Some((source, dest)) => match BackupTask::spawn(source, dest, BACKUP_INTERVAL) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(fields = ?e.log_fields(), "Backup not started");
                    None
                }
            },
            None => None,
        };
        Ok((collectors, backup))
    }

    fn stop_instrument(&self) {
        if let Err(e) = self
            .instrument
            .detector
            .set_instrument_mode(InstrumentMode::Mode0)
        {
            warn!(fields = ?e.log_fields(), "Failed to return instrument to mode 0");
        }
    }

    fn close_main(&self) {
        if self.manager.is_open(RunType::Main) {
            if let Err(e) = self.manager.close_run(RunType::Main) {
                warn!(fields = ?e.log_fields(), "Failed to close MAIN run");
            }
        }
    }

    fn run_scurve_session(&self) -> Result<IngestReport> {
        let watcher = DirectoryWatcher::new(&self.config.paths.data_dir)?;
        self.power_up(&[SubSystem::DetectorBoard, SubSystem::AnalogBoard])?;
        let pipeline = self.spawn_pipeline(watcher)?;

        let params = self.config.scurve.params;
        info!(
            start = params.start,
            step = params.step,
            stop = params.stop,
            acc = params.acc,
            "Starting S-curve scan"
        );
        if let Err(e) = self.instrument.detector.scurve(&params) {
            warn!(fields = ?e.log_fields(), "S-curve scan failed");
            self.switch.raise();
            let _ = join(pipeline);
            self.close_main();
            return Err(e);
        }
        let report = join(pipeline);
        self.close_main();
        report
    }
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquisition")
            .field("state", &self.state())
            .field("instrument", &self.instrument)
            .finish_non_exhaustive()
    }
}

fn join(handle: JoinHandle<Result<IngestReport>>) -> Result<IngestReport> {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

fn cancelled() -> IngestReport {
    IngestReport {
        outcome: IngestOutcome::Cancelled,
        stats: IngestStats::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{DetectorBoard, PowerStatus, PowerSwitch, SimInstrument};
    use std::path::Path;

    fn config(root: &Path, run_size: u32) -> Config {
        let text = format!(
            r#"
[acquisition]
run_size = {run_size}
n1 = 1
n2 = 1
single_run = true

[scurve]
start = 0
step = 2
stop = 10
acc = 1
dynode_voltage = 900

[paths]
data_dir = "{data}"
done_dir = "{done}"

[ingest]
poll_ms = 10
frame_settle_ms = 0
scurve_settle_ms = 0
hv_settle_ms = 0

[layout]
l1_size = 4
l2_size = 8
l3_size = 16
scurve_len = 32
hv_log_len = 8

[housekeeping]
light_poll_ms = 10
day_light_threshold = 500.0
night_light_threshold = 100.0
therm_on = true
therm_poll_ms = 10
"#,
            data = root.join("data").display(),
            done = root.join("done").display(),
        );
        Config::from_toml_str(&text).unwrap()
    }

    fn acquisition(root: &Path, run_size: u32) -> (Arc<SimInstrument>, Acquisition) {
        let config = config(root, run_size);
        let sim = Arc::new(
            SimInstrument::new(&config.paths.data_dir, config.layout)
                .with_frame_period(Duration::from_millis(20)),
        );
        let acq = Acquisition::new(config, Instrument::simulated(Arc::clone(&sim))).unwrap();
        (sim, acq)
    }

    #[test]
    fn test_collect_data_single_run() {
        let dir = tempfile::tempdir().unwrap();
        let (sim, acq) = acquisition(dir.path(), 3);

        let report = acq.collect_data().unwrap();
        let summary = match report.outcome {
            IngestOutcome::SingleRunComplete(summary) => summary,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(summary.packets, 3);
        assert!(summary.path.starts_with(dir.path().join("done")));
        assert_eq!(sim.instrument_mode(), InstrumentMode::Mode0);
        assert_eq!(sim.n_pkts(), (1, 1));
        assert!(!acq.manager().is_open(RunType::Main));
        assert!(acq.state().is_idle());
        assert_eq!(sim.status(SubSystem::Thermistors).unwrap(), PowerStatus::On);
    }

    #[test]
    fn test_collect_scurve() {
        let dir = tempfile::tempdir().unwrap();
        let (_sim, acq) = acquisition(dir.path(), 3);

        let report = acq.collect_scurve().unwrap();
        let summary = match report.outcome {
            IngestOutcome::ScurveWritten(summary) => summary,
            other => panic!("unexpected {other:?}"),
        };
        assert!(summary.file_name().unwrap().ends_with("__900.dat"));
        assert_eq!(report.stats.packets_written, 1);
    }

    #[test]
    fn test_scurve_session_closes_main_run() {
        let dir = tempfile::tempdir().unwrap();
        let (_sim, acq) = acquisition(dir.path(), 3);
        acq.manager().create_run(RunType::Main).unwrap();

        acq.collect_scurve().unwrap();
        assert!(!acq.manager().is_open(RunType::Main));
        assert!(!acq.manager().is_open(RunType::Scurve));
    }

    #[test]
    fn test_shutdown_waits_for_running_session() {
        let dir = tempfile::tempdir().unwrap();
        let (sim, acq) = acquisition(dir.path(), 1000);
        let acq = Arc::new(acq);

        let worker = Arc::clone(&acq);
        let handle = std::thread::spawn(move || worker.collect_data());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while acq.manager().packet_count(RunType::Main).unwrap_or(0) == 0
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }

        // The session closed its own run before shutdown returned.
        assert!(acq.shutdown().is_empty());
        assert_eq!(acq.state(), RunState::Stopped);
        assert_eq!(sim.instrument_mode(), InstrumentMode::Mode0);
        assert!(!acq.manager().is_open(RunType::Main));
        assert_eq!(std::fs::read_dir(dir.path().join("done")).unwrap().count(), 1);

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.outcome, IngestOutcome::Cancelled);
        assert!(report.stats.packets_written > 0);
    }

    #[test]
    fn test_request_switch_stops_collection() {
        let dir = tempfile::tempdir().unwrap();
        let (_sim, acq) = acquisition(dir.path(), 1000);
        let acq = Arc::new(acq);

        let worker = Arc::clone(&acq);
        let handle = std::thread::spawn(move || worker.collect_data());
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(acq.state(), RunState::Running(RunType::Main));
        acq.request_switch();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.outcome, IngestOutcome::Cancelled);
        assert!(!acq.manager().is_open(RunType::Main));
        assert!(acq.state().is_idle());
        assert!(!acq.switch().is_raised());
    }

    #[test]
    fn test_shutdown_blocks_further_collection() {
        let dir = tempfile::tempdir().unwrap();
        let (sim, acq) = acquisition(dir.path(), 3);
        acq.manager().create_run(RunType::HighVoltage).unwrap();

        let closed = acq.shutdown();
        assert_eq!(closed.len(), 1);
        assert_eq!(acq.state(), RunState::Stopped);
        assert!(matches!(acq.collect_data(), Err(AcqError::Busy { .. })));
        assert_eq!(sim.status(SubSystem::DetectorBoard).unwrap(), PowerStatus::Off);
    }

    #[test]
    fn test_watch_failure_creates_no_run() {
        let dir = tempfile::tempdir().unwrap();
        let (_sim, acq) = acquisition(dir.path(), 3);
        std::fs::remove_dir_all(dir.path().join("data")).unwrap();

        assert!(matches!(acq.collect_data(), Err(AcqError::Watch { .. })));
        assert_eq!(std::fs::read_dir(dir.path().join("done")).unwrap().count(), 0);
        assert!(acq.state().is_idle());
    }
}
