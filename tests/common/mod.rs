// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Common utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use cpudaq::format::{DetectorFrame, LightLevels, RecordLayout};
use cpudaq::run::RunNamer;
use cpudaq::storage::StorageSelector;
use cpudaq::{Config, RawInputs, RunManager, RunSummary, RunType};

// ============================================================================
// Layout and configuration
// ============================================================================

/// Small record geometry so test files stay tiny.
pub fn layout() -> RecordLayout {
    RecordLayout {
        l1_size: 4,
        l2_size: 8,
        l3_size: 16,
        scurve_len: 32,
        hv_log_len: 8,
    }
}

/// A complete configuration document rooted at `root`.
///
/// `extra` is appended to the `[acquisition]` section.
pub fn config_toml(root: &Path, run_size: u32, extra: &str) -> String {
    format!(
        r#"
[acquisition]
run_size = {run_size}
n1 = 1
n2 = 1
{extra}

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
light_poll_ms = 20
day_light_threshold = 500.0
night_light_threshold = 100.0
"#,
        data = root.join("data").display(),
        done = root.join("done").display(),
    )
}

pub fn config(root: &Path, run_size: u32, extra: &str) -> Config {
    Config::from_toml_str(&config_toml(root, run_size, extra)).expect("valid test config")
}

// ============================================================================
// Scratch workspace
// ============================================================================

/// Temporary data and done directories.
pub struct Workspace {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
    pub data: PathBuf,
    pub done: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().to_path_buf();
        let data = root.join("data");
        let done = root.join("done");
        std::fs::create_dir_all(&data).expect("create data dir");
        std::fs::create_dir_all(&done).expect("create done dir");
        Self {
            _dir: dir,
            root,
            data,
            done,
        }
    }

    pub fn manager(&self, capacity: u32) -> RunManager {
        let namer = RunNamer::new(StorageSelector::new(vec![], &self.done), 900);
        RunManager::new(namer, capacity, layout())
    }
}

/// Run files in `dir`, sorted by name.
pub fn run_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "dat"))
        .collect();
    files.sort();
    files
}

/// Regular files in `dir`, ignoring sub-directories.
pub fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .count()
}

// ============================================================================
// Run file fixtures
// ============================================================================

pub fn main_inputs() -> RawInputs {
    RawInputs::Main {
        n1: 1,
        n2: 1,
        frame: Ok(DetectorFrame::zeroed(1, 1, &layout())),
        light: Ok(LightLevels::default()),
    }
}

/// Write a closed MAIN run with `packets` packets.
pub fn write_main_run(manager: &RunManager, packets: u32) -> RunSummary {
    manager.create_run(RunType::Main).expect("create run");
    for _ in 0..packets {
        manager.build_and_write(main_inputs()).expect("write packet");
    }
    manager.close_run(RunType::Main).expect("close run")
}
