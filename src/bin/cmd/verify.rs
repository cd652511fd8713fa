// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Verify command - check run file checksums and framing in parallel.

use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use rayon::prelude::*;
use serde::Serialize;

use crate::common::Result;
use cpudaq::{RunFileReader, Verification};

/// Recompute and check run file checksums.
#[derive(Args, Clone, Debug)]
pub struct VerifyCmd {
    /// Run files
    #[arg(value_name = "FILE", required = true)]
    inputs: Vec<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FileResult {
    Checked(Verification),
    Unreadable { path: String, error: String },
}

impl FileResult {
    fn is_ok(&self) -> bool {
        matches!(self, FileResult::Checked(v) if v.is_ok())
    }
}

impl VerifyCmd {
    pub fn run(self) -> Result<()> {
        let results: Vec<FileResult> = self
            .inputs
            .par_iter()
            .map(|path| match RunFileReader::open(path) {
                Ok(reader) => FileResult::Checked(reader.verify()),
                Err(e) => FileResult::Unreadable {
                    path: path.display().to_string(),
                    error: e.to_string(),
                },
            })
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else {
            for result in &results {
                match result {
                    FileResult::Checked(v) if v.is_ok() => println!(
                        "OK   {} ({} {} packets, crc {:#010x})",
                        v.path, v.packet_count, v.run_type, v.stored_crc
                    ),
                    FileResult::Checked(v) => {
                        println!("FAIL {}", v.path);
                        for problem in &v.problems {
                            println!("     {problem}");
                        }
                    }
                    FileResult::Unreadable { path, error } => println!("FAIL {path}: {error}"),
                }
            }
        }

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        if failed > 0 {
            bail!("{failed} of {} files failed verification", results.len());
        }
        Ok(())
    }
}
