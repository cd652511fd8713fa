// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Run file naming.
//!
//! ```text
//! CPU_RUN_MAIN__2019_08_27__22_15_42.dat
//! CPU_RUN_SC__2019_08_27__22_15_42__950.dat
//! CPU_RUN_HV__2019_08_27__22_15_42.dat
//! ```
//!
//! Times are UTC. When a file of the same name already exists (two runs
//! opened within one second) a counter is appended: `..._1.dat`, `..._2.dat`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::core::RunType;
use crate::storage::StorageSelector;

const EXTENSION: &str = "dat";

/// Builds unique paths for new run files.
#[derive(Debug, Clone)]
pub struct RunNamer {
    storage: StorageSelector,
    dynode_voltage: u32,
}

impl RunNamer {
    pub fn new(storage: StorageSelector, dynode_voltage: u32) -> Self {
        Self {
            storage,
            dynode_voltage,
        }
    }

    pub fn storage(&self) -> &StorageSelector {
        &self.storage
    }

    /// File stem for a run opened at `at`.
    pub fn stem(&self, run_type: RunType, at: DateTime<Utc>) -> String {
        let stamp = at.format("%Y_%m_%d__%H_%M_%S");
        match run_type {
            RunType::Scurve => format!("CPU_RUN_{}__{stamp}__{}", run_type.tag(), self.dynode_voltage),
            _ => format!("CPU_RUN_{}__{stamp}", run_type.tag()),
        }
    }

    /// A path in the current output directory that does not exist yet.
    pub fn path_at(&self, run_type: RunType, at: DateTime<Utc>) -> PathBuf {
        let dir = self.storage.output_dir();
        let stem = self.stem(run_type, at);
        let mut path = dir.join(format!("{stem}.{EXTENSION}"));
        let mut counter = 1u32;
        while path.exists() {
            path = dir.join(format!("{stem}_{counter}.{EXTENSION}"));
            counter += 1;
        }
        path
    }

    pub fn next_path(&self, run_type: RunType) -> PathBuf {
        self.path_at(run_type, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 8, 27, 22, 15, 42).unwrap()
    }

    #[test]
    fn test_stems() {
        let namer = RunNamer::new(StorageSelector::new(vec![], "/done"), 950);
        assert_eq!(namer.stem(RunType::Main, at()), "CPU_RUN_MAIN__2019_08_27__22_15_42");
        assert_eq!(namer.stem(RunType::Scurve, at()), "CPU_RUN_SC__2019_08_27__22_15_42__950");
        assert_eq!(namer.stem(RunType::HighVoltage, at()), "CPU_RUN_HV__2019_08_27__22_15_42");
    }

    #[test]
    fn test_same_second_collision_gets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let namer = RunNamer::new(StorageSelector::new(vec![], dir.path()), 0);

        let first = namer.path_at(RunType::Main, at());
        assert_eq!(first, dir.path().join("CPU_RUN_MAIN__2019_08_27__22_15_42.dat"));
        std::fs::write(&first, b"").unwrap();

        let second = namer.path_at(RunType::Main, at());
        assert_eq!(second, dir.path().join("CPU_RUN_MAIN__2019_08_27__22_15_42_1.dat"));
        std::fs::write(&second, b"").unwrap();

        let third = namer.path_at(RunType::Main, at());
        assert!(third.ends_with("CPU_RUN_MAIN__2019_08_27__22_15_42_2.dat"));
    }

    #[test]
    fn test_uses_removable_storage_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let usb0 = dir.path().join("usb0");
        std::fs::create_dir(&usb0).unwrap();
        let namer = RunNamer::new(StorageSelector::new(vec![usb0.clone()], dir.path().join("done")), 0);
        assert!(namer.path_at(RunType::HighVoltage, at()).starts_with(&usb0));
    }
}
