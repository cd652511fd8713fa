// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Run file binary format.
//!
//! A run file is laid out as:
//!
//! ```text
//! FileHeader | packet 0 | packet 1 | ... | FileTrailer
//! ```
//!
//! All multi-byte fields are little-endian. The trailer CRC-32 covers every
//! byte from the start of the file header up to the trailer.
//!
//! - [`header`] - File header, trailer and packet header records
//! - [`timestamp`] - Packed calendar timestamp
//! - [`packet`] - MAIN, SCURVE and HIGH_VOLTAGE packets
//! - [`reader`] - Memory-mapped run file reader and verifier

pub mod constants;
pub mod header;
pub mod packet;
pub mod reader;
pub mod timestamp;

use std::io::Write;

pub use header::{FileHeader, FileTrailer, HeaderWord, PacketHeader};
pub use packet::{
    DetectorFrame, HkRecord, HvPacket, LightLevels, MainPacket, Packet, RecordLayout,
    ScurvePacket, ScurveParams,
};
pub use reader::{PacketIter, RunFileReader, Verification};
pub use timestamp::CpuTimestamp;

/// A record with a fixed little-endian wire representation.
pub trait Encode {
    /// Number of bytes `encode` will emit.
    fn encoded_len(&self) -> usize;

    /// Serialize into `w`.
    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()>;

    /// Serialize into a fresh buffer.
    fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }
}
