// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! The ingest loop.
//!
//! ```text
//! loop:
//!   switch raised?          -> Cancelled
//!   poll source (timeout)   -> Timeout: again / Closed: SourceClosed
//!   switch raised?          -> Cancelled
//!   directory               -> log, again
//!   frm*                    -> MAIN packet (rotate at capacity)
//!   sc*                     -> one-packet SC run, ScurveWritten
//!   hv*                     -> one-packet HV run, HighVoltageWritten
//!   anything else           -> UnexpectedFile
//! ```
//!
//! Settle delays before reading a file are waits on the mode switch, so a
//! switch request interrupts them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::control::Signal;
use crate::core::{Result, RunType};
use crate::format::{DetectorFrame, HvPacket, ScurvePacket, ScurveParams};
use crate::hardware::AnalogBoard;
use crate::run::{PacketOutcome, RawInputs, RunManager, RunSummary};

use super::classify::{classify, InputKind};
use super::event::{EventSource, IngestEvent, Poll};

/// Per-session pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub n1: u32,
    pub n2: u32,
    pub scurve_params: ScurveParams,
    pub keep_inputs: bool,
    /// Stop once the first MAIN run is full
    pub single_run: bool,
    pub poll: Duration,
    pub frame_settle: Duration,
    pub scurve_settle: Duration,
    pub hv_settle: Duration,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            n1: config.acquisition.n1,
            n2: config.acquisition.n2,
            scurve_params: config.scurve.params,
            keep_inputs: config.acquisition.keep_inputs,
            single_run: config.acquisition.single_run,
            poll: config.ingest.poll,
            frame_settle: config.ingest.frame_settle,
            scurve_settle: config.ingest.scurve_settle,
            hv_settle: config.ingest.hv_settle,
        }
    }
}

/// Why the ingest loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IngestOutcome {
    /// The mode switch was raised
    Cancelled,
    /// A MAIN run reached capacity in single-run mode
    SingleRunComplete(RunSummary),
    ScurveWritten(RunSummary),
    HighVoltageWritten(RunSummary),
    /// A file with an unrecognised name appeared
    UnexpectedFile(PathBuf),
    /// The event source went away
    SourceClosed,
}

/// Counters accumulated over one ingest session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub packets_written: u64,
    pub bad_packets: u64,
    /// MAIN runs closed because they reached capacity
    pub runs_rotated: u64,
    pub files_seen: u64,
}

/// Outcome plus statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub outcome: IngestOutcome,
    pub stats: IngestStats,
}

/// Turns sensor output files into run file packets.
pub struct IngestPipeline<S: EventSource> {
    source: S,
    manager: Arc<RunManager>,
    analog: Arc<dyn AnalogBoard>,
    switch: Arc<Signal>,
    options: IngestOptions,
    stats: IngestStats,
}

impl<S: EventSource> IngestPipeline<S> {
    pub fn new(
        source: S,
        manager: Arc<RunManager>,
        analog: Arc<dyn AnalogBoard>,
        switch: Arc<Signal>,
        options: IngestOptions,
    ) -> Self {
        Self {
            source,
            manager,
            analog,
            switch,
            options,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Run until an outcome is reached.
    ///
    /// Unreadable inputs are counted and skipped; run file failures end the
    /// loop with an error. The event source is dropped on return.
    pub fn run(mut self) -> Result<IngestReport> {
        info!("Ingest pipeline started");
        let outcome = self.event_loop();
        match &outcome {
            Ok(outcome) => info!(
                outcome = ?outcome,
                packets = self.stats.packets_written,
                bad_packets = self.stats.bad_packets,
                rotated = self.stats.runs_rotated,
                "Ingest pipeline finished"
            ),
            Err(e) => warn!(error = %e, fields = ?e.log_fields(), "Ingest pipeline failed"),
        }
        Ok(IngestReport {
            outcome: outcome?,
            stats: self.stats,
        })
    }

    fn event_loop(&mut self) -> Result<IngestOutcome> {
        loop {
            if self.switch.is_raised() {
                return Ok(IngestOutcome::Cancelled);
            }
            let event = match self.source.poll(self.options.poll) {
                Poll::Event(event) => event,
                Poll::Timeout => continue,
                Poll::Closed => return Ok(IngestOutcome::SourceClosed),
            };
            if self.switch.is_raised() {
                return Ok(IngestOutcome::Cancelled);
            }

            let path = match event {
                IngestEvent::DirectoryCreated(path) => {
                    info!(dir = %path.display(), "Directory created, ignoring");
                    continue;
                }
                IngestEvent::FileCreated(path) => path,
            };
            self.stats.files_seen += 1;
            debug!(file = %path.display(), "New input file");

            let finished = match classify(&path) {
                Some(InputKind::Frame) => self.handle_frame(&path)?,
                Some(InputKind::Scurve) => self.handle_scurve(&path)?,
                Some(InputKind::HighVoltage) => self.handle_hv(&path)?,
                None => {
                    warn!(file = %path.display(), "Unexpected input file, stopping");
                    Some(IngestOutcome::UnexpectedFile(path))
                }
            };
            if let Some(outcome) = finished {
                return Ok(outcome);
            }
        }
    }

    /// Wait before reading a fresh file. `true` if cancelled meanwhile.
    fn settle(&self, delay: Duration) -> bool {
        !delay.is_zero() && self.switch.wait_timeout(delay)
    }

    fn handle_frame(&mut self, path: &Path) -> Result<Option<IngestOutcome>> {
        let capacity = self.manager.capacity();
        if self.manager.packet_count(RunType::Main) == Some(capacity) {
            self.manager.close_run(RunType::Main)?;
            self.stats.runs_rotated += 1;
        }
        if !self.manager.is_open(RunType::Main) {
            self.manager.create_run(RunType::Main)?;
        }

        if self.settle(self.options.frame_settle) {
            return Ok(Some(IngestOutcome::Cancelled));
        }

        let IngestOptions { n1, n2, .. } = self.options;
        let inputs = RawInputs::Main {
            n1,
            n2,
            frame: DetectorFrame::read(path, n1, n2, self.manager.layout()),
            light: self.analog.read_light_levels(),
        };

        match self.manager.build_and_write(inputs)? {
            PacketOutcome::Written { sequence, .. } => {
                self.stats.packets_written += 1;
                debug!(file = %path.display(), sequence, "Frame recorded");
                self.consume(path);
            }
            PacketOutcome::Skipped { .. } => {
                self.stats.bad_packets += 1;
                return Ok(None);
            }
        }

        if self.options.single_run && self.manager.packet_count(RunType::Main) == Some(capacity) {
            let summary = self.manager.close_run(RunType::Main)?;
            return Ok(Some(IngestOutcome::SingleRunComplete(summary)));
        }
        Ok(None)
    }

    fn handle_scurve(&mut self, path: &Path) -> Result<Option<IngestOutcome>> {
        if self.settle(self.options.scurve_settle) {
            return Ok(Some(IngestOutcome::Cancelled));
        }
        let data = ScurvePacket::read_data(path, self.manager.layout());
        let inputs = RawInputs::Scurve {
            params: self.options.scurve_params,
            data,
        };
        let summary = self.single_packet_run(RunType::Scurve, inputs, path)?;
        Ok(Some(IngestOutcome::ScurveWritten(summary)))
    }

    fn handle_hv(&mut self, path: &Path) -> Result<Option<IngestOutcome>> {
        if self.settle(self.options.hv_settle) {
            return Ok(Some(IngestOutcome::Cancelled));
        }
        let inputs = RawInputs::HighVoltage {
            log: HvPacket::read_log(path, self.manager.layout()),
        };
        let summary = self.single_packet_run(RunType::HighVoltage, inputs, path)?;
        Ok(Some(IngestOutcome::HighVoltageWritten(summary)))
    }

    fn single_packet_run(
        &mut self,
        run_type: RunType,
        inputs: RawInputs,
        path: &Path,
    ) -> Result<RunSummary> {
        self.manager.create_run(run_type)?;
        let written = match self.manager.build_and_write(inputs) {
            Ok(outcome) => outcome.is_written(),
            Err(e) => {
                // Finalise what exists before reporting the failure.
                if let Err(close) = self.manager.close_run(run_type) {
                    warn!(error = %close, "Failed to close run after write failure");
                }
                return Err(e);
            }
        };
        let summary = self.manager.close_run(run_type)?;
        if written {
            self.stats.packets_written += 1;
            self.consume(path);
        } else {
            self.stats.bad_packets += 1;
        }
        Ok(summary)
    }

    /// Remove an ingested input file unless configured to keep it.
    fn consume(&self, path: &Path) {
        if self.options.keep_inputs {
            return;
        }
        if let Err(e) = std::fs::remove_file(path) {
            warn!(file = %path.display(), error = %e, "Failed to remove ingested input");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{RecordLayout, RunFileReader};
    use crate::hardware::SimInstrument;
    use crate::ingest::ChannelSource;
    use crate::run::RunNamer;
    use crate::storage::StorageSelector;
    use crossbeam_channel::Sender;

    fn layout() -> RecordLayout {
        RecordLayout {
            l1_size: 4,
            l2_size: 8,
            l3_size: 16,
            scurve_len: 32,
            hv_log_len: 8,
        }
    }

    fn options() -> IngestOptions {
        IngestOptions {
            n1: 1,
            n2: 1,
            scurve_params: ScurveParams::default(),
            keep_inputs: false,
            single_run: false,
            poll: Duration::from_millis(10),
            frame_settle: Duration::ZERO,
            scurve_settle: Duration::ZERO,
            hv_settle: Duration::ZERO,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        data: PathBuf,
        done: PathBuf,
        manager: Arc<RunManager>,
        sim: Arc<SimInstrument>,
        switch: Arc<Signal>,
    }

    impl Fixture {
        fn new(capacity: u32) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let data = dir.path().join("data");
            let done = dir.path().join("done");
            std::fs::create_dir_all(&data).unwrap();
            std::fs::create_dir_all(&done).unwrap();
            let namer = RunNamer::new(StorageSelector::new(vec![], &done), 0);
            Self {
                manager: Arc::new(RunManager::new(namer, capacity, layout())),
                sim: Arc::new(SimInstrument::new(&data, layout())),
                switch: Arc::new(Signal::new()),
                data,
                done,
                _dir: dir,
            }
        }

        fn pipeline(
            &self,
            options: IngestOptions,
        ) -> (Sender<IngestEvent>, IngestPipeline<ChannelSource>) {
            let (tx, source) = ChannelSource::channel();
            let pipeline = IngestPipeline::new(
                source,
                Arc::clone(&self.manager),
                self.sim.clone(),
                Arc::clone(&self.switch),
                options,
            );
            (tx, pipeline)
        }

        fn frame(&self) -> IngestEvent {
            IngestEvent::FileCreated(self.sim.files().write_frame(1, 1).unwrap())
        }
    }

    #[test]
    fn test_frames_rotate_lazily() {
        let fx = Fixture::new(2);
        let (tx, pipeline) = fx.pipeline(options());
        for _ in 0..5 {
            tx.send(fx.frame()).unwrap();
        }
        drop(tx);

        let report = pipeline.run().unwrap();
        assert_eq!(report.outcome, IngestOutcome::SourceClosed);
        assert_eq!(report.stats.packets_written, 5);
        assert_eq!(report.stats.runs_rotated, 2);
        assert_eq!(fx.manager.packet_count(RunType::Main), Some(1));
        fx.manager.close_all();

        assert_eq!(std::fs::read_dir(&fx.done).unwrap().count(), 3);
        let leftover = std::fs::read_dir(&fx.data)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().is_file())
            .count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_single_run_stops_at_capacity() {
        let fx = Fixture::new(3);
        let (tx, pipeline) = fx.pipeline(IngestOptions {
            single_run: true,
            ..options()
        });
        for _ in 0..5 {
            tx.send(fx.frame()).unwrap();
        }

        let report = pipeline.run().unwrap();
        match report.outcome {
            IngestOutcome::SingleRunComplete(summary) => assert_eq!(summary.packets, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!fx.manager.is_open(RunType::Main));
    }

    #[test]
    fn test_unreadable_frame_is_skipped() {
        let fx = Fixture::new(10);
        let (tx, pipeline) = fx.pipeline(options());
        tx.send(fx.frame()).unwrap();
        let short = fx.data.join("frm_cc_99999999.dat");
        std::fs::write(&short, [0u8; 3]).unwrap();
        tx.send(IngestEvent::FileCreated(short.clone())).unwrap();
        tx.send(fx.frame()).unwrap();
        drop(tx);

        let report = pipeline.run().unwrap();
        assert_eq!(report.stats.packets_written, 2);
        assert_eq!(report.stats.bad_packets, 1);
        assert!(short.exists());
        let summary = fx.manager.close_run(RunType::Main).unwrap();
        assert_eq!(summary.packets, 2);
        assert_eq!(summary.bad_packets, 1);
    }

    #[test]
    fn test_failed_light_read_is_skipped() {
        let fx = Fixture::new(10);
        let (tx, pipeline) = fx.pipeline(options());
        fx.sim.fail_light_reads(true);
        tx.send(fx.frame()).unwrap();
        drop(tx);

        let report = pipeline.run().unwrap();
        assert_eq!(report.stats.bad_packets, 1);
        assert_eq!(fx.manager.packet_count(RunType::Main), Some(0));
    }

    #[test]
    fn test_scurve_file_ends_loop() {
        let fx = Fixture::new(10);
        let (tx, pipeline) = fx.pipeline(options());
        let sc = fx.sim.files().write_scurve().unwrap();
        tx.send(IngestEvent::DirectoryCreated(fx.data.join(".staging"))).unwrap();
        tx.send(IngestEvent::FileCreated(sc.clone())).unwrap();
        tx.send(fx.frame()).unwrap();

        let report = pipeline.run().unwrap();
        let summary = match report.outcome {
            IngestOutcome::ScurveWritten(summary) => summary,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(summary.packets, 1);
        assert!(!sc.exists());
        assert!(!fx.manager.is_open(RunType::Main));
        let reader = RunFileReader::open(&summary.path).unwrap();
        assert!(reader.verify().is_ok());
    }

    #[test]
    fn test_hv_file_ends_loop() {
        let fx = Fixture::new(10);
        let (tx, pipeline) = fx.pipeline(options());
        tx.send(IngestEvent::FileCreated(fx.sim.files().write_hv().unwrap()))
            .unwrap();

        let report = pipeline.run().unwrap();
        assert!(matches!(report.outcome, IngestOutcome::HighVoltageWritten(_)));
        assert_eq!(report.stats.packets_written, 1);
    }

    #[test]
    fn test_unexpected_file_ends_loop() {
        let fx = Fixture::new(10);
        let (tx, pipeline) = fx.pipeline(options());
        let odd = fx.data.join("notes.txt");
        tx.send(IngestEvent::FileCreated(odd.clone())).unwrap();
        tx.send(fx.frame()).unwrap();

        let report = pipeline.run().unwrap();
        assert_eq!(report.outcome, IngestOutcome::UnexpectedFile(odd));
        assert_eq!(report.stats.packets_written, 0);
    }

    #[test]
    fn test_raised_switch_cancels_before_processing() {
        let fx = Fixture::new(10);
        let (tx, pipeline) = fx.pipeline(options());
        tx.send(fx.frame()).unwrap();
        fx.switch.raise();

        let report = pipeline.run().unwrap();
        assert_eq!(report.outcome, IngestOutcome::Cancelled);
        assert_eq!(report.stats.files_seen, 0);
        assert!(!fx.manager.is_open(RunType::Main));
    }

    #[test]
    fn test_switch_interrupts_settle_delay() {
        let fx = Fixture::new(10);
        let (tx, pipeline) = fx.pipeline(IngestOptions {
            hv_settle: Duration::from_secs(60),
            ..options()
        });
        tx.send(IngestEvent::FileCreated(fx.sim.files().write_hv().unwrap()))
            .unwrap();

        let switch = Arc::clone(&fx.switch);
        let handle = std::thread::spawn(move || pipeline.run());
        std::thread::sleep(Duration::from_millis(50));
        let start = std::time::Instant::now();
        switch.raise();
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.outcome, IngestOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!fx.manager.is_open(RunType::HighVoltage));
    }
}
