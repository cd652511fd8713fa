// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! End-to-end acquisition sessions against the simulated instrument.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpudaq::hardware::{DetectorBoard, Instrument, InstrumentMode, SimInstrument};
use cpudaq::{Acquisition, Config, IngestOutcome, RunFileReader, RunState, RunType};

use common::{config, config_toml, count_files, run_files, Workspace};

fn acquisition(
    ws: &Workspace,
    config: Config,
    period_ms: u64,
) -> (Arc<SimInstrument>, Acquisition) {
    let sim = Arc::new(
        SimInstrument::new(&ws.data, config.layout)
            .with_frame_period(Duration::from_millis(period_ms)),
    );
    let acq = Acquisition::new(config, Instrument::simulated(Arc::clone(&sim))).unwrap();
    (sim, acq)
}

#[test]
fn test_data_then_scurve_session() {
    let ws = Workspace::new();
    let (sim, acq) = acquisition(&ws, config(&ws.root, 4, "single_run = true"), 10);

    let report = acq.collect_data().unwrap();
    assert!(matches!(report.outcome, IngestOutcome::SingleRunComplete(_)));
    assert_eq!(report.stats.packets_written, 4);
    assert_eq!(sim.instrument_mode(), InstrumentMode::Mode0);

    let report = acq.collect_scurve().unwrap();
    assert!(matches!(report.outcome, IngestOutcome::ScurveWritten(_)));
    assert_eq!(acq.state(), RunState::Idle);

    let files = run_files(&ws.done);
    assert_eq!(files.len(), 2);
    let mut types: Vec<RunType> = files
        .iter()
        .map(|f| {
            let reader = RunFileReader::open(f).unwrap();
            assert!(reader.verify().is_ok());
            reader.run_type()
        })
        .collect();
    types.sort();
    assert_eq!(types, vec![RunType::Main, RunType::Scurve]);
}

#[test]
fn test_switch_then_shutdown() {
    let ws = Workspace::new();
    let (_sim, acq) = acquisition(&ws, config(&ws.root, 1000, ""), 10);
    let acq = Arc::new(acq);

    let worker = Arc::clone(&acq);
    let handle = thread::spawn(move || worker.collect_data());
    thread::sleep(Duration::from_millis(150));
    acq.request_switch();

    let report = handle.join().unwrap().unwrap();
    assert_eq!(report.outcome, IngestOutcome::Cancelled);
    assert!(report.stats.packets_written > 0);

    let files = run_files(&ws.done);
    assert_eq!(files.len(), 1);
    let verification = RunFileReader::open(&files[0]).unwrap().verify();
    assert!(verification.is_ok());
    assert_eq!(verification.packet_count as u64, report.stats.packets_written);

    assert!(acq.shutdown().is_empty());
    assert_eq!(acq.state(), RunState::Stopped);
}

#[test]
fn test_removable_storage_receives_runs() {
    let ws = Workspace::new();
    let usb0 = ws.root.join("usb0");
    std::fs::create_dir_all(&usb0).unwrap();
    let mut text = config_toml(&ws.root, 2, "single_run = true");
    text = text.replace(
        "[ingest]",
        &format!("usb_mountpoints = [\"{}\"]\n\n[ingest]", usb0.display()),
    );
    let config = Config::from_toml_str(&text).unwrap();
    let (_sim, acq) = acquisition(&ws, config, 10);

    acq.collect_data().unwrap();
    assert_eq!(run_files(&usb0).len(), 1);
    assert_eq!(count_files(&ws.done), 0);
}

#[test]
fn test_override_file_is_layered() {
    let ws = Workspace::new();
    let local = ws.root.join("cpu.toml");
    std::fs::write(&local, config_toml(&ws.root, 100, "")).unwrap();
    let usb0 = ws.root.join("usb0_cpu.toml");
    let usb1 = ws.root.join("usb1_cpu.toml");
    std::fs::write(&usb1, "[acquisition]\nrun_size = 25\n").unwrap();

    let config = Config::load(&local, &[usb0, usb1]).unwrap();
    assert_eq!(config.acquisition.run_size, 25);
    assert_eq!(config.scurve.dynode_voltage, 900);
}
