// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # cpudaq CLI
//!
//! Run acquisition sessions and examine the run files they produce.
//!
//! ## Usage
//!
//! ```sh
//! # Collect data with the settings in cpu.toml
//! cpudaq acquire --config cpu.toml
//!
//! # One S-curve scan against the simulated instrument
//! cpudaq acquire --config cpu.toml --scurve --simulate
//!
//! # Show a run file
//! cpudaq inspect CPU_RUN_MAIN__2026_10_18__10_00_00.dat
//!
//! # Check checksums of many files
//! cpudaq verify /media/usb0/*.dat
//! ```

mod cmd;
mod common;

use std::process;

use clap::{Parser, Subcommand};
use cmd::{AcquireCmd, InspectCmd, VerifyCmd};
use common::Result;

/// cpudaq - onboard data acquisition
///
/// Turns detector, S-curve and high-voltage output files into checksummed
/// run files.
#[derive(Parser, Clone)]
#[command(name = "cpudaq")]
#[command(about = "Onboard data acquisition and run file toolkit", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "ArcheBase")]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Clone)]
enum Commands {
    /// Run an acquisition session
    Acquire(AcquireCmd),

    /// Show the header, packets and trailer of a run file
    Inspect(InspectCmd),

    /// Recompute and check run file checksums
    Verify(VerifyCmd),
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    common::init_tracing(cli.verbose);

    match cli.command {
        Commands::Acquire(cmd) => cmd.run(),
        Commands::Inspect(cmd) => cmd.run(),
        Commands::Verify(cmd) => cmd.run(),
    }
}

fn main() {
    let result = run();

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
