// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Inspect command - show the structure of a run file.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::common::{format_size, Result};
use cpudaq::format::Packet;
use cpudaq::{RunFileReader, RunType};

/// Show the header, packets and trailer of a run file.
#[derive(Args, Clone, Debug)]
pub struct InspectCmd {
    /// Run file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Print as JSON
    #[arg(long)]
    json: bool,

    /// List every packet
    #[arg(long)]
    packets: bool,
}

#[derive(Serialize)]
struct FileSummary {
    path: String,
    run_type: RunType,
    version: u8,
    capacity: u32,
    bytes: usize,
    packet_count: usize,
    crc: u32,
    crc_ok: bool,
    problems: Vec<String>,
    packets: Vec<PacketSummary>,
}

#[derive(Serialize)]
struct PacketSummary {
    sequence: u32,
    size: u32,
    timestamp: String,
    detail: PacketDetail,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PacketDetail {
    Main {
        n1: u32,
        n2: u32,
        photodiode_mean: f32,
    },
    Scurve {
        start: u32,
        step: u32,
        stop: u32,
        acc: u32,
        data_len: usize,
    },
    HighVoltage {
        log_len: usize,
    },
}

impl PacketSummary {
    fn new(packet: &Packet) -> Self {
        let detail = match packet {
            Packet::Main(p) => PacketDetail::Main {
                n1: p.detector.n1,
                n2: p.detector.n2,
                photodiode_mean: p.housekeeping.levels.photodiode_mean(),
            },
            Packet::Scurve(p) => PacketDetail::Scurve {
                start: p.params.start,
                step: p.params.step,
                stop: p.params.stop,
                acc: p.params.acc,
                data_len: p.data.len(),
            },
            Packet::HighVoltage(p) => PacketDetail::HighVoltage {
                log_len: p.log.len(),
            },
        };
        let header = packet.header();
        Self {
            sequence: header.sequence,
            size: header.size,
            timestamp: packet.timestamp().to_string(),
            detail,
        }
    }
}

impl InspectCmd {
    pub fn run(self) -> Result<()> {
        let reader = RunFileReader::open(&self.input)?;
        let verification = reader.verify();
        let packets = reader
            .packets()
            .map(|packet| packet.map(|p| PacketSummary::new(&p)))
            .collect::<cpudaq::Result<Vec<_>>>()?;

        let summary = FileSummary {
            path: self.input.display().to_string(),
            run_type: reader.run_type(),
            version: reader.header().version,
            capacity: reader.header().capacity,
            bytes: reader.file_len(),
            packet_count: packets.len(),
            crc: reader.trailer().crc,
            crc_ok: verification.computed_crc == verification.stored_crc,
            problems: verification.problems,
            packets,
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary, self.packets);
        }
        Ok(())
    }
}

fn print_summary(summary: &FileSummary, list_packets: bool) {
    println!("=== {} ===", summary.path);
    println!("Run type: {}", summary.run_type);
    println!("Version: {}", summary.version);
    println!("Capacity: {}", summary.capacity);
    println!("Size: {}", format_size(summary.bytes as u64));
    println!("Packets: {}", summary.packet_count);
    println!(
        "CRC: {:#010x} ({})",
        summary.crc,
        if summary.crc_ok { "ok" } else { "MISMATCH" }
    );
    for problem in &summary.problems {
        println!("Problem: {problem}");
    }
    if let (Some(first), Some(last)) = (summary.packets.first(), summary.packets.last()) {
        println!("First packet: {}", first.timestamp);
        println!("Last packet: {}", last.timestamp);
    }

    if list_packets {
        println!();
        for packet in &summary.packets {
            let detail = match &packet.detail {
                PacketDetail::Main {
                    n1,
                    n2,
                    photodiode_mean,
                } => format!("n1={n1} n2={n2} light={photodiode_mean:.2}"),
                PacketDetail::Scurve {
                    start,
                    step,
                    stop,
                    acc,
                    data_len,
                } => format!("scan {start}..{stop} step {step} acc {acc}, {data_len} bytes"),
                PacketDetail::HighVoltage { log_len } => format!("{log_len} bytes of log"),
            };
            println!(
                "  [{}] {} | {} bytes | {}",
                packet.sequence, packet.timestamp, packet.size, detail
            );
        }
    }
}
