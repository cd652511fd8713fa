// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Fixed-size file header, file trailer and packet header records.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::core::{AcqError, Result, RunType};

use super::constants::{
    FILE_HEADER_SIZE, FILE_MARKER, FILE_TRAILER_SIZE, FILE_VERSION, INSTRUMENT_ID, PACKET_HEADER_SIZE,
    PACKET_MARKER,
};
use super::Encode;

/// The packed identification word opening file and packet headers.
///
/// `marker << 24 | instrument << 16 | record_type << 8 | version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderWord {
    pub marker: u8,
    pub instrument: u8,
    pub record_type: u8,
    pub version: u8,
}

impl HeaderWord {
    pub fn new(marker: u8, record_type: u8, version: u8) -> Self {
        Self {
            marker,
            instrument: INSTRUMENT_ID,
            record_type,
            version,
        }
    }

    pub fn pack(&self) -> u32 {
        (self.marker as u32) << 24
            | (self.instrument as u32) << 16
            | (self.record_type as u32) << 8
            | self.version as u32
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            marker: (word >> 24) as u8,
            instrument: (word >> 16) as u8,
            record_type: (word >> 8) as u8,
            version: word as u8,
        }
    }
}

/// Record opening every run file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub run_type: RunType,
    pub version: u8,
    /// Intended packets per file (the rotation threshold)
    pub capacity: u32,
}

impl FileHeader {
    pub fn new(run_type: RunType, capacity: u32) -> Self {
        Self {
            run_type,
            version: FILE_VERSION,
            capacity,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(AcqError::format(
                "FileHeader",
                format!("need {FILE_HEADER_SIZE} bytes, have {}", bytes.len()),
            ));
        }
        let mut cursor = bytes;
        let word = HeaderWord::unpack(read_u32(&mut cursor, "FileHeader")?);
        let capacity = read_u32(&mut cursor, "FileHeader")?;

        if word.marker != FILE_MARKER {
            return Err(AcqError::format(
                "FileHeader",
                format!("bad marker {:#04x}", word.marker),
            ));
        }
        if word.instrument != INSTRUMENT_ID {
            return Err(AcqError::format(
                "FileHeader",
                format!("unknown instrument {}", word.instrument),
            ));
        }
        let run_type = RunType::from_code(word.record_type).ok_or_else(|| {
            AcqError::format(
                "FileHeader",
                format!("unknown file type {}", word.record_type),
            )
        })?;

        Ok(Self {
            run_type,
            version: word.version,
            capacity,
        })
    }
}

impl Encode for FileHeader {
    fn encoded_len(&self) -> usize {
        FILE_HEADER_SIZE
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let word = HeaderWord::new(FILE_MARKER, self.run_type.code(), self.version);
        w.write_u32::<LittleEndian>(word.pack())?;
        w.write_u32::<LittleEndian>(self.capacity)
    }
}

/// Record closing every run file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileTrailer {
    pub capacity: u32,
    /// CRC-32 of every byte preceding the trailer
    pub crc: u32,
}

impl FileTrailer {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_TRAILER_SIZE {
            return Err(AcqError::format(
                "FileTrailer",
                format!("need {FILE_TRAILER_SIZE} bytes, have {}", bytes.len()),
            ));
        }
        let mut cursor = bytes;
        Ok(Self {
            capacity: read_u32(&mut cursor, "FileTrailer")?,
            crc: read_u32(&mut cursor, "FileTrailer")?,
        })
    }
}

impl Encode for FileTrailer {
    fn encoded_len(&self) -> usize {
        FILE_TRAILER_SIZE
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.capacity)?;
        w.write_u32::<LittleEndian>(self.crc)
    }
}

/// Header opening every packet and housekeeping sub-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub version: u8,
    /// Serialized size of the whole packet, header included
    pub size: u32,
    pub sequence: u32,
}

impl PacketHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(AcqError::format(
                "PacketHeader",
                format!("need {PACKET_HEADER_SIZE} bytes, have {}", bytes.len()),
            ));
        }
        let mut cursor = bytes;
        let word = HeaderWord::unpack(read_u32(&mut cursor, "PacketHeader")?);
        if word.marker != PACKET_MARKER {
            return Err(AcqError::format(
                "PacketHeader",
                format!("bad marker {:#04x}", word.marker),
            ));
        }
        Ok(Self {
            packet_type: word.record_type,
            version: word.version,
            size: read_u32(&mut cursor, "PacketHeader")?,
            sequence: read_u32(&mut cursor, "PacketHeader")?,
        })
    }
}

impl Encode for PacketHeader {
    fn encoded_len(&self) -> usize {
        PACKET_HEADER_SIZE
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let word = HeaderWord::new(PACKET_MARKER, self.packet_type, self.version);
        w.write_u32::<LittleEndian>(word.pack())?;
        w.write_u32::<LittleEndian>(self.size)?;
        w.write_u32::<LittleEndian>(self.sequence)
    }
}

pub(crate) fn read_u32<R: Read>(r: &mut R, context: &str) -> Result<u32> {
    r.read_u32::<LittleEndian>()
        .map_err(|e| AcqError::format(context, format!("truncated field: {e}")))
}
