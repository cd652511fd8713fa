// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Packet variants and the raw sensor payloads they carry.
//!
//! Every packet starts with a [`PacketHeader`] whose `size` field is computed
//! from the serialized structure, followed by a [`CpuTimestamp`] word.
//!
//! # MAIN packet
//!
//! ```text
//! PacketHeader | timestamp | HK sub-record | detector sub-record
//! HK sub-record:       PacketHeader | timestamp | f32 x 4 | f32 x 64 | f32
//! detector sub-record: n1 | l1_size | n2 | l2_size | l3_size | level 1 | level 2 | level 3
//! ```
//!
//! # SCURVE packet
//!
//! ```text
//! PacketHeader | timestamp | start | step | stop | acc | data_len | data
//! ```
//!
//! # HIGH_VOLTAGE packet
//!
//! ```text
//! PacketHeader | timestamp | log_len | log
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::core::{AcqError, Result, RunType};

use super::constants::*;
use super::header::{read_u32, PacketHeader};
use super::timestamp::CpuTimestamp;
use super::Encode;

/// Byte sizes of the raw records produced by the sensor sub-systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordLayout {
    /// One level-1 detector record
    pub l1_size: u32,
    /// One level-2 detector record
    pub l2_size: u32,
    /// The level-3 detector record
    pub l3_size: u32,
    /// S-curve scan data
    pub scurve_len: u32,
    /// High-voltage log
    pub hv_log_len: u32,
}

impl Default for RecordLayout {
    fn default() -> Self {
        let frame = FRAMES_PER_LEVEL * PIXELS_PER_PDM;
        Self {
            l1_size: (DETECTOR_RECORD_PREAMBLE + frame) as u32,
            l2_size: (DETECTOR_RECORD_PREAMBLE + 2 * frame) as u32,
            l3_size: (DETECTOR_RECORD_PREAMBLE + 4 * frame) as u32,
            scurve_len: (4 * SCURVE_THRESHOLDS * PIXELS_PER_PDM) as u32,
            hv_log_len: (4 * HV_LOG_ENTRIES) as u32,
        }
    }
}

impl RecordLayout {
    /// Size of a detector frame file holding `n1` level-1 and `n2` level-2 records.
    pub fn frame_len(&self, n1: u32, n2: u32) -> usize {
        n1 as usize * self.l1_size as usize
            + n2 as usize * self.l2_size as usize
            + self.l3_size as usize
    }

    /// Serialized size of a MAIN packet.
    pub fn main_packet_len(&self, n1: u32, n2: u32) -> usize {
        PACKET_HEADER_SIZE
            + TIMESTAMP_SIZE
            + HK_RECORD_SIZE
            + DETECTOR_PREFIX_SIZE
            + self.frame_len(n1, n2)
    }

    /// Serialized size of an SCURVE packet.
    pub fn scurve_packet_len(&self) -> usize {
        PACKET_HEADER_SIZE + TIMESTAMP_SIZE + SCURVE_PARAMS_SIZE + self.scurve_len as usize
    }

    /// Serialized size of a HIGH_VOLTAGE packet.
    pub fn hv_packet_len(&self) -> usize {
        PACKET_HEADER_SIZE + TIMESTAMP_SIZE + HV_PREFIX_SIZE + self.hv_log_len as usize
    }
}

/// Read exactly `len` bytes from the start of a sensor output file.
fn read_input(path: &Path, len: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path)
        .map_err(|e| AcqError::input_read(path, format!("cannot open: {e}")))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)
        .map_err(|e| AcqError::input_read(path, format!("expected {len} bytes: {e}")))?;
    Ok(buf)
}

/// Raw output of one detector board readout: three data levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorFrame {
    pub n1: u32,
    pub n2: u32,
    pub l1_size: u32,
    pub l2_size: u32,
    pub l3_size: u32,
    /// `n1` level-1 records, back to back
    pub level1: Vec<u8>,
    /// `n2` level-2 records, back to back
    pub level2: Vec<u8>,
    pub level3: Vec<u8>,
}

impl DetectorFrame {
    /// Read a frame file produced by the detector board.
    ///
    /// Bytes beyond the expected frame length are ignored.
    pub fn read(path: impl AsRef<Path>, n1: u32, n2: u32, layout: &RecordLayout) -> Result<Self> {
        let path = path.as_ref();
        let mut data = read_input(path, layout.frame_len(n1, n2))?;

        let l1_end = n1 as usize * layout.l1_size as usize;
        let l2_end = l1_end + n2 as usize * layout.l2_size as usize;
        let level3 = data.split_off(l2_end);
        let level2 = data.split_off(l1_end);

        Ok(Self {
            n1,
            n2,
            l1_size: layout.l1_size,
            l2_size: layout.l2_size,
            l3_size: layout.l3_size,
            level1: data,
            level2,
            level3,
        })
    }

    /// A frame of zeroes, standing in for a failed readout.
    pub fn zeroed(n1: u32, n2: u32, layout: &RecordLayout) -> Self {
        Self {
            n1,
            n2,
            l1_size: layout.l1_size,
            l2_size: layout.l2_size,
            l3_size: layout.l3_size,
            level1: vec![0; n1 as usize * layout.l1_size as usize],
            level2: vec![0; n2 as usize * layout.l2_size as usize],
            level3: vec![0; layout.l3_size as usize],
        }
    }

    fn encoded_len(&self) -> usize {
        DETECTOR_PREFIX_SIZE + self.level1.len() + self.level2.len() + self.level3.len()
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.n1)?;
        w.write_u32::<LittleEndian>(self.l1_size)?;
        w.write_u32::<LittleEndian>(self.n2)?;
        w.write_u32::<LittleEndian>(self.l2_size)?;
        w.write_u32::<LittleEndian>(self.l3_size)?;
        w.write_all(&self.level1)?;
        w.write_all(&self.level2)?;
        w.write_all(&self.level3)
    }

    fn decode(cursor: &mut &[u8]) -> Result<Self> {
        let ctx = "DetectorRecord";
        let n1 = read_u32(cursor, ctx)?;
        let l1_size = read_u32(cursor, ctx)?;
        let n2 = read_u32(cursor, ctx)?;
        let l2_size = read_u32(cursor, ctx)?;
        let l3_size = read_u32(cursor, ctx)?;
        let level1 = take(cursor, n1 as usize * l1_size as usize, ctx)?;
        let level2 = take(cursor, n2 as usize * l2_size as usize, ctx)?;
        let level3 = take(cursor, l3_size as usize, ctx)?;
        Ok(Self {
            n1,
            n2,
            l1_size,
            l2_size,
            l3_size,
            level1,
            level2,
            level3,
        })
    }
}

/// One reading of the analog light-sensor board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightLevels {
    /// Photodiode channel averages
    pub photodiode: [f32; N_CHANNELS_PHOTODIODE],
    /// Multiplexed SiPM array
    pub sipm: [f32; N_CHANNELS_SIPM],
    /// Single-channel SiPM average
    pub sipm_single: f32,
}

impl Default for LightLevels {
    fn default() -> Self {
        Self {
            photodiode: [0.0; N_CHANNELS_PHOTODIODE],
            sipm: [0.0; N_CHANNELS_SIPM],
            sipm_single: 0.0,
        }
    }
}

impl LightLevels {
    /// Mean over the photodiode channels.
    pub fn photodiode_mean(&self) -> f32 {
        self.photodiode.iter().sum::<f32>() / N_CHANNELS_PHOTODIODE as f32
    }
}

/// Housekeeping sub-record embedded in MAIN packets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HkRecord {
    pub header: PacketHeader,
    pub timestamp: CpuTimestamp,
    pub levels: LightLevels,
}

impl HkRecord {
    pub fn new(sequence: u32, timestamp: CpuTimestamp, levels: LightLevels) -> Self {
        Self {
            header: PacketHeader {
                packet_type: PACKET_TYPE_HK,
                version: PACKET_VERSION_HK,
                size: HK_RECORD_SIZE as u32,
                sequence,
            },
            timestamp,
            levels,
        }
    }

    fn decode(cursor: &mut &[u8]) -> Result<Self> {
        let header = PacketHeader::decode(*cursor)?;
        *cursor = &cursor[PACKET_HEADER_SIZE..];
        let timestamp = CpuTimestamp::from_raw(read_u32(cursor, "HkRecord")?)?;
        let mut levels = LightLevels::default();
        for value in levels
            .photodiode
            .iter_mut()
            .chain(levels.sipm.iter_mut())
            .chain(std::iter::once(&mut levels.sipm_single))
        {
            *value = cursor
                .read_f32::<LittleEndian>()
                .map_err(|e| AcqError::format("HkRecord", format!("truncated levels: {e}")))?;
        }
        Ok(Self {
            header,
            timestamp,
            levels,
        })
    }
}

impl Encode for HkRecord {
    fn encoded_len(&self) -> usize {
        HK_RECORD_SIZE
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        self.header.encode(w)?;
        w.write_u32::<LittleEndian>(self.timestamp.raw())?;
        for value in self
            .levels
            .photodiode
            .iter()
            .chain(self.levels.sipm.iter())
            .chain(std::iter::once(&self.levels.sipm_single))
        {
            w.write_f32::<LittleEndian>(*value)?;
        }
        Ok(())
    }
}

/// Detector frame plus housekeeping reading.
#[derive(Debug, Clone, PartialEq)]
pub struct MainPacket {
    pub header: PacketHeader,
    pub timestamp: CpuTimestamp,
    pub housekeeping: HkRecord,
    pub detector: DetectorFrame,
}

impl MainPacket {
    pub fn build(
        sequence: u32,
        timestamp: CpuTimestamp,
        levels: LightLevels,
        detector: DetectorFrame,
    ) -> Self {
        let size = PACKET_HEADER_SIZE + TIMESTAMP_SIZE + HK_RECORD_SIZE + detector.encoded_len();
        Self {
            header: PacketHeader {
                packet_type: PACKET_TYPE_MAIN,
                version: PACKET_VERSION_MAIN,
                size: size as u32,
                sequence,
            },
            timestamp,
            housekeeping: HkRecord::new(sequence, timestamp, levels),
            detector,
        }
    }
}

impl Encode for MainPacket {
    fn encoded_len(&self) -> usize {
        self.header.size as usize
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        self.header.encode(w)?;
        w.write_u32::<LittleEndian>(self.timestamp.raw())?;
        self.housekeeping.encode(w)?;
        self.detector.encode(w)
    }
}

/// Scan configuration recorded alongside S-curve data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScurveParams {
    pub start: u32,
    pub step: u32,
    pub stop: u32,
    pub acc: u32,
}

/// One complete threshold scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScurvePacket {
    pub header: PacketHeader,
    pub timestamp: CpuTimestamp,
    pub params: ScurveParams,
    pub data: Vec<u8>,
}

impl ScurvePacket {
    pub fn build(sequence: u32, timestamp: CpuTimestamp, params: ScurveParams, data: Vec<u8>) -> Self {
        let size = PACKET_HEADER_SIZE + TIMESTAMP_SIZE + SCURVE_PARAMS_SIZE + data.len();
        Self {
            header: PacketHeader {
                packet_type: PACKET_TYPE_SCURVE,
                version: PACKET_VERSION_SCURVE,
                size: size as u32,
                sequence,
            },
            timestamp,
            params,
            data,
        }
    }

    /// Read an S-curve output file.
    pub fn read_data(path: impl AsRef<Path>, layout: &RecordLayout) -> Result<Vec<u8>> {
        read_input(path.as_ref(), layout.scurve_len as usize)
    }
}

impl Encode for ScurvePacket {
    fn encoded_len(&self) -> usize {
        self.header.size as usize
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        self.header.encode(w)?;
        w.write_u32::<LittleEndian>(self.timestamp.raw())?;
        w.write_u32::<LittleEndian>(self.params.start)?;
        w.write_u32::<LittleEndian>(self.params.step)?;
        w.write_u32::<LittleEndian>(self.params.stop)?;
        w.write_u32::<LittleEndian>(self.params.acc)?;
        w.write_u32::<LittleEndian>(self.data.len() as u32)?;
        w.write_all(&self.data)
    }
}

/// High-voltage power supply log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HvPacket {
    pub header: PacketHeader,
    pub timestamp: CpuTimestamp,
    pub log: Vec<u8>,
}

impl HvPacket {
    pub fn build(sequence: u32, timestamp: CpuTimestamp, log: Vec<u8>) -> Self {
        let size = PACKET_HEADER_SIZE + TIMESTAMP_SIZE + HV_PREFIX_SIZE + log.len();
        Self {
            header: PacketHeader {
                packet_type: PACKET_TYPE_HV,
                version: PACKET_VERSION_HV,
                size: size as u32,
                sequence,
            },
            timestamp,
            log,
        }
    }

    /// Read a high-voltage log file.
    pub fn read_log(path: impl AsRef<Path>, layout: &RecordLayout) -> Result<Vec<u8>> {
        read_input(path.as_ref(), layout.hv_log_len as usize)
    }
}

impl Encode for HvPacket {
    fn encoded_len(&self) -> usize {
        self.header.size as usize
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        self.header.encode(w)?;
        w.write_u32::<LittleEndian>(self.timestamp.raw())?;
        w.write_u32::<LittleEndian>(self.log.len() as u32)?;
        w.write_all(&self.log)
    }
}

/// A packet of any run type.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Main(MainPacket),
    Scurve(ScurvePacket),
    HighVoltage(HvPacket),
}

impl Packet {
    pub fn run_type(&self) -> RunType {
        match self {
            Packet::Main(_) => RunType::Main,
            Packet::Scurve(_) => RunType::Scurve,
            Packet::HighVoltage(_) => RunType::HighVoltage,
        }
    }

    pub fn header(&self) -> &PacketHeader {
        match self {
            Packet::Main(p) => &p.header,
            Packet::Scurve(p) => &p.header,
            Packet::HighVoltage(p) => &p.header,
        }
    }

    pub fn timestamp(&self) -> CpuTimestamp {
        match self {
            Packet::Main(p) => p.timestamp,
            Packet::Scurve(p) => p.timestamp,
            Packet::HighVoltage(p) => p.timestamp,
        }
    }

    /// Decode one packet from the start of `bytes`.
    ///
    /// The slice must hold at least the size announced by the packet header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::decode(bytes)?;
        let size = header.size as usize;
        if size > bytes.len() || size < PACKET_HEADER_SIZE + TIMESTAMP_SIZE {
            return Err(AcqError::format(
                "Packet",
                format!(
                    "packet {} announces {size} bytes, {} available",
                    header.sequence,
                    bytes.len()
                ),
            ));
        }

        let mut cursor = &bytes[PACKET_HEADER_SIZE..size];
        let timestamp = CpuTimestamp::from_raw(read_u32(&mut cursor, "Packet")?)?;

        let packet = match header.packet_type {
            PACKET_TYPE_MAIN => {
                let housekeeping = HkRecord::decode(&mut cursor)?;
                let detector = DetectorFrame::decode(&mut cursor)?;
                Packet::Main(MainPacket {
                    header,
                    timestamp,
                    housekeeping,
                    detector,
                })
            }
            PACKET_TYPE_SCURVE => {
                let params = ScurveParams {
                    start: read_u32(&mut cursor, "ScurvePacket")?,
                    step: read_u32(&mut cursor, "ScurvePacket")?,
                    stop: read_u32(&mut cursor, "ScurvePacket")?,
                    acc: read_u32(&mut cursor, "ScurvePacket")?,
                };
                let len = read_u32(&mut cursor, "ScurvePacket")? as usize;
                let data = take(&mut cursor, len, "ScurvePacket")?;
                Packet::Scurve(ScurvePacket {
                    header,
                    timestamp,
                    params,
                    data,
                })
            }
            PACKET_TYPE_HV => {
                let len = read_u32(&mut cursor, "HvPacket")? as usize;
                let log = take(&mut cursor, len, "HvPacket")?;
                Packet::HighVoltage(HvPacket {
                    header,
                    timestamp,
                    log,
                })
            }
            other => {
                return Err(AcqError::format(
                    "Packet",
                    format!("unknown packet type {other}"),
                ))
            }
        };

        if !cursor.is_empty() {
            return Err(AcqError::format(
                "Packet",
                format!(
                    "packet {} has {} trailing bytes",
                    header.sequence,
                    cursor.len()
                ),
            ));
        }
        Ok(packet)
    }
}

impl Encode for Packet {
    fn encoded_len(&self) -> usize {
        self.header().size as usize
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        match self {
            Packet::Main(p) => p.encode(w),
            Packet::Scurve(p) => p.encode(w),
            Packet::HighVoltage(p) => p.encode(w),
        }
    }
}

fn take(cursor: &mut &[u8], len: usize, context: &str) -> Result<Vec<u8>> {
    if cursor.len() < len {
        return Err(AcqError::format(
            context,
            format!("need {len} bytes, have {}", cursor.len()),
        ));
    }
    let (head, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(head.to_vec())
}
