// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Run lifecycle: open, append, close.
//!
//! [`RunManager`] owns at most one open [`Run`] per [`RunType`]. Each slot
//! has its own lock, so a MAIN run and an HV run can be written from
//! different threads without contending.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::{AcqError, Result, RunType};
use crate::format::{
    CpuTimestamp, DetectorFrame, FileHeader, FileTrailer, HvPacket, LightLevels, MainPacket,
    RecordLayout, ScurvePacket, ScurveParams,
};
use crate::io::SyncFile;
use crate::storage::StorageSelector;

use super::naming::RunNamer;

/// One open run file.
#[derive(Debug)]
pub struct Run {
    pub run_type: RunType,
    pub path: PathBuf,
    writer: Arc<SyncFile>,
    /// Sequence number of the next packet; equals packets written
    sequence: u32,
    bad_packets: u32,
}

impl Run {
    pub fn packets_written(&self) -> u32 {
        self.sequence
    }

    pub fn bad_packets(&self) -> u32 {
        self.bad_packets
    }
}

/// Statistics of a closed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_type: RunType,
    pub path: PathBuf,
    pub packets: u32,
    pub bad_packets: u32,
    /// File length including the trailer
    pub bytes: u64,
    pub crc: u32,
}

/// Raw sensor reads for one packet.
///
/// Each payload is the result of the read attempt; a failed read makes
/// the packet a candidate for skipping.
#[derive(Debug)]
pub enum RawInputs {
    Main {
        n1: u32,
        n2: u32,
        frame: Result<DetectorFrame>,
        light: Result<LightLevels>,
    },
    Scurve {
        params: ScurveParams,
        data: Result<Vec<u8>>,
    },
    HighVoltage {
        log: Result<Vec<u8>>,
    },
}

impl RawInputs {
    pub fn run_type(&self) -> RunType {
        match self {
            RawInputs::Main { .. } => RunType::Main,
            RawInputs::Scurve { .. } => RunType::Scurve,
            RawInputs::HighVoltage { .. } => RunType::HighVoltage,
        }
    }
}

/// What [`RunManager::build_and_write`] did with a packet.
#[derive(Debug)]
pub enum PacketOutcome {
    Written { sequence: u32, bytes: usize },
    /// An input was missing; nothing was written
    Skipped { cause: AcqError },
}

impl PacketOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, PacketOutcome::Written { .. })
    }
}

/// Owns the open run file of each type.
#[derive(Debug)]
pub struct RunManager {
    namer: RunNamer,
    capacity: u32,
    layout: RecordLayout,
    tolerate_first_packet_failure: bool,
    slots: [Mutex<Option<Run>>; 3],
}

impl RunManager {
    pub fn new(namer: RunNamer, capacity: u32, layout: RecordLayout) -> Self {
        Self {
            namer,
            capacity,
            layout,
            tolerate_first_packet_failure: false,
            slots: Default::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let storage = StorageSelector::new(
            config.paths.usb_mountpoints.clone(),
            config.paths.done_dir.clone(),
        );
        Self::new(
            RunNamer::new(storage, config.scurve.dynode_voltage),
            config.acquisition.run_size,
            config.layout,
        )
        .with_first_packet_tolerance(config.acquisition.tolerate_first_packet_failure)
    }

    /// Write the first MAIN packet of each run even if one of its inputs
    /// failed, zero-filling the missing part.
    pub fn with_first_packet_tolerance(mut self, enabled: bool) -> Self {
        self.tolerate_first_packet_failure = enabled;
        self
    }

    /// Rotation threshold, recorded as capacity in headers and trailers.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    fn slot(&self, run_type: RunType) -> MutexGuard<'_, Option<Run>> {
        self.slots[run_type.slot()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Open a new run file and write its header.
    ///
    /// # Errors
    ///
    /// [`AcqError::RunAlreadyOpen`] if a run of this type is open, or an I/O
    /// error if the file cannot be created.
    pub fn create_run(&self, run_type: RunType) -> Result<PathBuf> {
        let mut slot = self.slot(run_type);
        if slot.is_some() {
            return Err(AcqError::RunAlreadyOpen { run_type });
        }

        let path = self.namer.next_path(run_type);
        let writer = Arc::new(SyncFile::create(&path)?);
        writer.write(&FileHeader::new(run_type, self.capacity))?;

        info!(
            run_type = run_type.tag(),
            path = %path.display(),
            capacity = self.capacity,
            "Created run"
        );
        *slot = Some(Run {
            run_type,
            path: path.clone(),
            writer,
            sequence: 0,
            bad_packets: 0,
        });
        Ok(path)
    }

    /// Write the trailer and close the run.
    ///
    /// The run is released even if writing the trailer fails.
    pub fn close_run(&self, run_type: RunType) -> Result<RunSummary> {
        let run = self
            .slot(run_type)
            .take()
            .ok_or(AcqError::NoOpenRun { run_type })?;
        finish(run, self.capacity)
    }

    /// Build a packet from raw inputs and append it to the open run.
    ///
    /// A missing input yields [`PacketOutcome::Skipped`]: the bad packet
    /// counter is incremented and the sequence number is kept. Write
    /// failures are returned as errors and are fatal to the run.
    pub fn build_and_write(&self, inputs: RawInputs) -> Result<PacketOutcome> {
        let run_type = inputs.run_type();
        let mut slot = self.slot(run_type);
        let run = slot.as_mut().ok_or(AcqError::NoOpenRun { run_type })?;
        let sequence = run.sequence;
        let timestamp = CpuTimestamp::now()?;

        let written = match inputs {
            RawInputs::Main {
                n1,
                n2,
                frame,
                light,
            } => {
                let tolerate = self.tolerate_first_packet_failure && sequence == 0;
                let (frame, light) = match (frame, light) {
                    (Ok(frame), Ok(light)) => (frame, light),
                    (frame, light) if tolerate => {
                        warn!(
                            path = %run.path.display(),
                            "Writing first packet of run with zero-filled inputs"
                        );
                        (
                            frame.unwrap_or_else(|_| DetectorFrame::zeroed(n1, n2, &self.layout)),
                            light.unwrap_or_default(),
                        )
                    }
                    (Err(cause), _) | (_, Err(cause)) => return Ok(skip(run, cause)),
                };
                run.writer
                    .write(&MainPacket::build(sequence, timestamp, light, frame))?
            }
            RawInputs::Scurve { params, data } => match data {
                Ok(data) => run
                    .writer
                    .write(&ScurvePacket::build(sequence, timestamp, params, data))?,
                Err(cause) => return Ok(skip(run, cause)),
            },
            RawInputs::HighVoltage { log } => match log {
                Ok(log) => run
                    .writer
                    .write(&HvPacket::build(sequence, timestamp, log))?,
                Err(cause) => return Ok(skip(run, cause)),
            },
        };

        run.sequence += 1;
        Ok(PacketOutcome::Written {
            sequence,
            bytes: written,
        })
    }

    /// Packets written to the open run of this type.
    pub fn packet_count(&self, run_type: RunType) -> Option<u32> {
        self.slot(run_type).as_ref().map(Run::packets_written)
    }

    pub fn bad_packets(&self, run_type: RunType) -> Option<u32> {
        self.slot(run_type).as_ref().map(Run::bad_packets)
    }

    pub fn is_open(&self, run_type: RunType) -> bool {
        self.slot(run_type).is_some()
    }

    pub fn path(&self, run_type: RunType) -> Option<PathBuf> {
        self.slot(run_type).as_ref().map(|run| run.path.clone())
    }

    /// Shared handle to the open run's writer, for auxiliary producers.
    pub fn writer(&self, run_type: RunType) -> Option<Arc<SyncFile>> {
        self.slot(run_type)
            .as_ref()
            .map(|run| Arc::clone(&run.writer))
    }

    /// Close every open run. Failures are logged and the remaining runs
    /// are still closed.
    pub fn close_all(&self) -> Vec<RunSummary> {
        RunType::ALL
            .into_iter()
            .filter_map(|run_type| {
                let run = self.slot(run_type).take()?;
                match finish(run, self.capacity) {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        warn!(run_type = run_type.tag(), error = %e, "Failed to close run");
                        None
                    }
                }
            })
            .collect()
    }
}

fn skip(run: &mut Run, cause: AcqError) -> PacketOutcome {
    run.bad_packets += 1;
    warn!(
        run_type = run.run_type.tag(),
        bad_packets = run.bad_packets,
        fields = ?cause.log_fields(),
        "Skipping packet with missing input"
    );
    PacketOutcome::Skipped { cause }
}

fn finish(run: Run, capacity: u32) -> Result<RunSummary> {
    let trailer = FileTrailer {
        capacity,
        crc: run.writer.checksum(),
    };
    let written = run.writer.write(&trailer);
    let closed = run.writer.close();
    written?;
    closed?;

    let summary = RunSummary {
        run_type: run.run_type,
        path: run.path,
        packets: run.sequence,
        bad_packets: run.bad_packets,
        bytes: run.writer.bytes_written(),
        crc: trailer.crc,
    };
    info!(
        run_type = summary.run_type.tag(),
        path = %summary.path.display(),
        packets = summary.packets,
        bad_packets = summary.bad_packets,
        crc = format_args!("{:#010x}", summary.crc),
        "Closed run"
    );
    Ok(summary)
}

impl RunSummary {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::constants::{FILE_HEADER_SIZE, FILE_TRAILER_SIZE};
    use crate::format::RunFileReader;

    fn layout() -> RecordLayout {
        RecordLayout {
            l1_size: 8,
            l2_size: 16,
            l3_size: 32,
            scurve_len: 64,
            hv_log_len: 16,
        }
    }

    fn manager(dir: &Path, capacity: u32) -> RunManager {
        let namer = RunNamer::new(StorageSelector::new(vec![], dir), 950);
        RunManager::new(namer, capacity, layout())
    }

    fn good_main() -> RawInputs {
        RawInputs::Main {
            n1: 2,
            n2: 1,
            frame: Ok(DetectorFrame::zeroed(2, 1, &layout())),
            light: Ok(LightLevels::default()),
        }
    }

    fn missing_frame() -> RawInputs {
        RawInputs::Main {
            n1: 2,
            n2: 1,
            frame: Err(AcqError::input_read("frm_cc_00000009.dat", "not found")),
            light: Ok(LightLevels::default()),
        }
    }

    #[test]
    fn test_run_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 10);
        manager.create_run(RunType::Main).unwrap();
        for expected in 0..3 {
            match manager.build_and_write(good_main()).unwrap() {
                PacketOutcome::Written { sequence, bytes } => {
                    assert_eq!(sequence, expected);
                    assert_eq!(bytes, layout().main_packet_len(2, 1));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        let summary = manager.close_run(RunType::Main).unwrap();
        assert_eq!(summary.packets, 3);

        let len = std::fs::metadata(&summary.path).unwrap().len() as usize;
        assert_eq!(
            len,
            FILE_HEADER_SIZE + 3 * layout().main_packet_len(2, 1) + FILE_TRAILER_SIZE
        );
        assert_eq!(summary.bytes as usize, len);

        let data = std::fs::read(&summary.path).unwrap();
        assert_eq!(crc32fast::hash(&data[..len - FILE_TRAILER_SIZE]), summary.crc);
        let reader = RunFileReader::open(&summary.path).unwrap();
        assert!(reader.verify().is_ok());
        assert_eq!(reader.trailer().capacity, 10);
    }

    #[test]
    fn test_one_open_run_per_type() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 10);
        manager.create_run(RunType::Main).unwrap();
        assert!(matches!(
            manager.create_run(RunType::Main),
            Err(AcqError::RunAlreadyOpen { run_type: RunType::Main })
        ));
        manager.create_run(RunType::HighVoltage).unwrap();
        assert!(manager.is_open(RunType::Main));
        assert!(manager.is_open(RunType::HighVoltage));
        assert!(!manager.is_open(RunType::Scurve));
        assert_eq!(manager.close_all().len(), 2);
        assert!(!manager.is_open(RunType::Main));
    }

    #[test]
    fn test_close_without_open_run() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 10);
        assert!(matches!(
            manager.close_run(RunType::Scurve),
            Err(AcqError::NoOpenRun { .. })
        ));
        assert!(matches!(
            manager.build_and_write(good_main()),
            Err(AcqError::NoOpenRun { .. })
        ));
    }

    #[test]
    fn test_skipped_packet_keeps_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 10);
        manager.create_run(RunType::Main).unwrap();

        assert!(!manager.build_and_write(missing_frame()).unwrap().is_written());
        assert_eq!(manager.packet_count(RunType::Main), Some(0));
        assert_eq!(manager.bad_packets(RunType::Main), Some(1));

        manager.build_and_write(good_main()).unwrap();
        let missing_light = RawInputs::Main {
            n1: 2,
            n2: 1,
            frame: Ok(DetectorFrame::zeroed(2, 1, &layout())),
            light: Err(AcqError::hardware("AnalogBoard", "timeout")),
        };
        assert!(!manager.build_and_write(missing_light).unwrap().is_written());

        let summary = manager.close_run(RunType::Main).unwrap();
        assert_eq!(summary.packets, 1);
        assert_eq!(summary.bad_packets, 2);
        let reader = RunFileReader::open(&summary.path).unwrap();
        assert_eq!(reader.packets().count(), 1);
    }

    #[test]
    fn test_first_packet_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 10).with_first_packet_tolerance(true);
        manager.create_run(RunType::Main).unwrap();

        assert!(manager.build_and_write(missing_frame()).unwrap().is_written());
        assert!(!manager.build_and_write(missing_frame()).unwrap().is_written());
        assert_eq!(manager.packet_count(RunType::Main), Some(1));
        assert_eq!(manager.bad_packets(RunType::Main), Some(1));
    }

    #[test]
    fn test_single_packet_runs() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 10);

        let path = manager.create_run(RunType::Scurve).unwrap();
        assert!(path.to_string_lossy().ends_with("__950.dat"));
        let outcome = manager
            .build_and_write(RawInputs::Scurve {
                params: ScurveParams::default(),
                data: Ok(vec![1; 64]),
            })
            .unwrap();
        assert!(outcome.is_written());
        let sc = manager.close_run(RunType::Scurve).unwrap();

        manager.create_run(RunType::HighVoltage).unwrap();
        manager
            .build_and_write(RawInputs::HighVoltage { log: Ok(vec![2; 16]) })
            .unwrap();
        let hv = manager.close_run(RunType::HighVoltage).unwrap();

        for summary in [sc, hv] {
            let reader = RunFileReader::open(&summary.path).unwrap();
            assert_eq!(reader.run_type(), summary.run_type);
            assert!(reader.verify().is_ok());
            assert_eq!(reader.packets().count(), 1);
        }
    }

    #[test]
    fn test_sequence_resets_on_new_run() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 2);
        manager.create_run(RunType::Main).unwrap();
        manager.build_and_write(good_main()).unwrap();
        manager.build_and_write(good_main()).unwrap();
        let first = manager.close_run(RunType::Main).unwrap();

        let second_path = manager.create_run(RunType::Main).unwrap();
        assert_ne!(first.path, second_path);
        match manager.build_and_write(good_main()).unwrap() {
            PacketOutcome::Written { sequence, .. } => assert_eq!(sequence, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_create_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir.path().join("absent"), 10);
        assert!(matches!(
            manager.create_run(RunType::Main),
            Err(AcqError::Io { .. })
        ));
        assert!(!manager.is_open(RunType::Main));
    }
}
