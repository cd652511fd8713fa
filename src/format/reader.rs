// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Reading closed run files back for inspection and integrity checks.

use std::path::Path;

use serde::Serialize;

use crate::core::{AcqError, Result, RunType};
use crate::io::MmapArena;

use super::constants::{FILE_HEADER_SIZE, FILE_TRAILER_SIZE};
use super::header::{FileHeader, FileTrailer, PacketHeader};
use super::packet::Packet;

/// A memory-mapped, closed run file.
#[derive(Debug)]
pub struct RunFileReader {
    arena: MmapArena,
    header: FileHeader,
    trailer: FileTrailer,
}

impl RunFileReader {
    /// Open a run file and decode its header and trailer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let arena = MmapArena::open(path)?;
        if arena.len() < FILE_HEADER_SIZE + FILE_TRAILER_SIZE {
            return Err(AcqError::format(
                arena.path().display().to_string(),
                format!("file too short for header and trailer: {} bytes", arena.len()),
            ));
        }
        let header = FileHeader::decode(arena.slice(0, FILE_HEADER_SIZE)?)?;
        let trailer = FileTrailer::decode(
            arena.slice(arena.len() - FILE_TRAILER_SIZE, FILE_TRAILER_SIZE)?,
        )?;
        Ok(Self {
            arena,
            header,
            trailer,
        })
    }

    pub fn path(&self) -> &Path {
        self.arena.path()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn trailer(&self) -> &FileTrailer {
        &self.trailer
    }

    pub fn run_type(&self) -> RunType {
        self.header.run_type
    }

    pub fn file_len(&self) -> usize {
        self.arena.len()
    }

    /// Bytes covered by the trailer CRC.
    fn body(&self) -> &[u8] {
        &self.arena[..self.arena.len() - FILE_TRAILER_SIZE]
    }

    /// Packet bytes between header and trailer.
    fn packet_region(&self) -> &[u8] {
        &self.body()[FILE_HEADER_SIZE..]
    }

    /// Iterate over fully decoded packets.
    pub fn packets(&self) -> PacketIter<'_> {
        PacketIter {
            data: self.packet_region(),
            offset: 0,
            failed: false,
        }
    }

    /// Walk packet headers without decoding payloads.
    pub fn packet_headers(&self) -> Result<Vec<PacketHeader>> {
        let data = self.packet_region();
        let mut offset = 0;
        let mut headers = Vec::new();
        while offset < data.len() {
            let header = PacketHeader::decode(&data[offset..])?;
            if header.size == 0 || offset + header.size as usize > data.len() {
                return Err(AcqError::format(
                    self.path().display().to_string(),
                    format!(
                        "packet {} at offset {} overruns the packet region",
                        header.sequence,
                        offset + FILE_HEADER_SIZE
                    ),
                ));
            }
            offset += header.size as usize;
            headers.push(header);
        }
        Ok(headers)
    }

    /// Recompute the CRC and check packet framing.
    pub fn verify(&self) -> Verification {
        let computed_crc = crc32fast::hash(self.body());
        let mut problems = Vec::new();

        if computed_crc != self.trailer.crc {
            problems.push(format!(
                "crc mismatch: stored {:#010x}, computed {computed_crc:#010x}",
                self.trailer.crc
            ));
        }
        if self.trailer.capacity != self.header.capacity {
            problems.push(format!(
                "trailer capacity {} differs from header capacity {}",
                self.trailer.capacity, self.header.capacity
            ));
        }

        let mut packet_count = 0;
        match self.packet_headers() {
            Ok(headers) => {
                packet_count = headers.len();
                for (expected, header) in headers.iter().enumerate() {
                    if header.packet_type != self.header.run_type.code() {
                        problems.push(format!(
                            "packet {expected} has type {}, file is {}",
                            header.packet_type, self.header.run_type
                        ));
                    }
                    if header.sequence as usize != expected {
                        problems.push(format!(
                            "packet {expected} carries sequence {}",
                            header.sequence
                        ));
                    }
                }
                if packet_count > self.header.capacity as usize {
                    problems.push(format!(
                        "{packet_count} packets exceed capacity {}",
                        self.header.capacity
                    ));
                }
            }
            Err(e) => problems.push(e.to_string()),
        }

        Verification {
            path: self.path().display().to_string(),
            run_type: self.header.run_type,
            capacity: self.header.capacity,
            packet_count,
            stored_crc: self.trailer.crc,
            computed_crc,
            problems,
        }
    }
}

/// Outcome of [`RunFileReader::verify`].
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub path: String,
    pub run_type: RunType,
    pub capacity: u32,
    pub packet_count: usize,
    pub stored_crc: u32,
    pub computed_crc: u32,
    pub problems: Vec<String>,
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Iterator over the packets of a run file.
///
/// Stops after the first decoding error.
pub struct PacketIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl Iterator for PacketIter<'_> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.offset..];
        let result = Packet::decode(rest);
        match &result {
            Ok(packet) => self.offset += packet.header().size as usize,
            Err(_) => self.failed = true,
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CpuTimestamp, Encode, HvPacket};

    fn write_hv_file(path: &Path, logs: &[Vec<u8>], corrupt: bool) {
        let mut bytes = FileHeader::new(RunType::HighVoltage, 4).to_bytes().unwrap();
        let ts = CpuTimestamp::from_raw((3 << 26) | (1 << 17)).unwrap();
        for (seq, log) in logs.iter().enumerate() {
            let packet = HvPacket::build(seq as u32, ts, log.clone());
            bytes.extend(packet.to_bytes().unwrap());
        }
        let crc = crc32fast::hash(&bytes);
        if corrupt {
            bytes[FILE_HEADER_SIZE + 20] ^= 0xFF;
        }
        bytes.extend(FileTrailer { capacity: 4, crc }.to_bytes().unwrap());
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_read_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hv.dat");
        write_hv_file(&path, &[vec![1; 8], vec![2; 8]], false);

        let reader = RunFileReader::open(&path).unwrap();
        assert_eq!(reader.run_type(), RunType::HighVoltage);
        let packets: Vec<_> = reader.packets().collect::<Result<_>>().unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].header().sequence, 1);

        let verification = reader.verify();
        assert!(verification.is_ok(), "{:?}", verification.problems);
        assert_eq!(verification.packet_count, 2);
    }

    #[test]
    fn test_verify_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hv.dat");
        write_hv_file(&path, &[vec![5; 8]], true);

        let verification = RunFileReader::open(&path).unwrap().verify();
        assert!(!verification.is_ok());
        assert!(verification.problems[0].starts_with("crc mismatch"));
    }

    #[test]
    fn test_empty_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hv.dat");
        write_hv_file(&path, &[], false);

        let reader = RunFileReader::open(&path).unwrap();
        assert_eq!(reader.packets().count(), 0);
        assert!(reader.verify().is_ok());
    }

    #[test]
    fn test_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.dat");
        std::fs::write(&path, [0u8; 10]).unwrap();
        assert!(RunFileReader::open(&path).is_err());
    }
}
