// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Run file format constants.
//!
//! Single source of truth for markers, record types, versions and fixed
//! record sizes shared by the writer and the reader. All multi-byte fields
//! are little-endian.

/// Marker byte opening a file header word.
pub const FILE_MARKER: u8 = b'C';
/// Marker byte opening a packet header word.
pub const PACKET_MARKER: u8 = b'P';

/// Instrument identifier carried in every header word.
pub const INSTRUMENT_ID: u8 = 2;

/// Run file format version.
pub const FILE_VERSION: u8 = 2;

/// Packet type codes. Run packet types share the [`RunType`](crate::RunType) codes.
pub const PACKET_TYPE_MAIN: u8 = 1;
pub const PACKET_TYPE_SCURVE: u8 = 2;
pub const PACKET_TYPE_HV: u8 = 3;
pub const PACKET_TYPE_HK: u8 = 4;

/// Packet layout versions.
pub const PACKET_VERSION_MAIN: u8 = 2;
pub const PACKET_VERSION_SCURVE: u8 = 1;
pub const PACKET_VERSION_HV: u8 = 1;
pub const PACKET_VERSION_HK: u8 = 1;

/// File header: marker word + run capacity.
pub const FILE_HEADER_SIZE: usize = 8;
/// File trailer: run capacity + CRC-32.
pub const FILE_TRAILER_SIZE: usize = 8;
/// Packet header: marker word + packet size + sequence number.
pub const PACKET_HEADER_SIZE: usize = 12;
/// Packed timestamp word.
pub const TIMESTAMP_SIZE: usize = 4;

/// Analog board channel counts.
pub const N_CHANNELS_PHOTODIODE: usize = 4;
pub const N_CHANNELS_SIPM: usize = 64;

/// Housekeeping sub-record: header, timestamp, photodiodes, SiPM array, single SiPM.
pub const HK_RECORD_SIZE: usize = PACKET_HEADER_SIZE
    + TIMESTAMP_SIZE
    + 4 * N_CHANNELS_PHOTODIODE
    + 4 * N_CHANNELS_SIPM
    + 4;

/// Detector sub-record prefix: n1, l1 size, n2, l2 size, l3 size.
pub const DETECTOR_PREFIX_SIZE: usize = 20;

/// Scan parameters (start, step, stop, acc) followed by the data length.
pub const SCURVE_PARAMS_SIZE: usize = 20;

/// High-voltage log length prefix.
pub const HV_PREFIX_SIZE: usize = 4;

// Flight detector geometry, used for the default record layout.

/// Pixels on one photo-detector module.
pub const PIXELS_PER_PDM: usize = 2304;
/// Frames per data level record.
pub const FRAMES_PER_LEVEL: usize = 128;
/// Detector record preamble: board header, frame time, trigger type, cathode status.
pub const DETECTOR_RECORD_PREAMBLE: usize = 36;
/// Threshold steps held by one scan record.
pub const SCURVE_THRESHOLDS: usize = 1024;
/// Entries in the high-voltage power supply log.
pub const HV_LOG_ENTRIES: usize = 1000;
