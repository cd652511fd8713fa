// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Packed 32-bit calendar timestamp.
//!
//! Bit layout, most significant first:
//!
//! | bits  | field                 | range        |
//! |-------|-----------------------|--------------|
//! | 31-26 | year - [`EPOCH_YEAR`] | 0..=63       |
//! | 25-22 | month (zero based)    | 0..=11       |
//! | 21-17 | day of month         | 1..=31       |
//! | 16-12 | hour                  | 0..=23       |
//! | 11-6  | minute                | 0..=59       |
//! | 5-0   | second                | 0..=59       |
//!
//! All values are UTC.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::core::{AcqError, Result};

/// First representable year.
pub const EPOCH_YEAR: i32 = 2017;
/// Last representable year (6-bit year offset).
pub const LAST_YEAR: i32 = EPOCH_YEAR + 63;

const YEAR_SHIFT: u32 = 26;
const MONTH_SHIFT: u32 = 22;
const DAY_SHIFT: u32 = 17;
const HOUR_SHIFT: u32 = 12;
const MINUTE_SHIFT: u32 = 6;

const YEAR_MASK: u32 = 0x3F;
const MONTH_MASK: u32 = 0x0F;
const DAY_MASK: u32 = 0x1F;
const HOUR_MASK: u32 = 0x1F;
const MINUTE_MASK: u32 = 0x3F;
const SECOND_MASK: u32 = 0x3F;

/// Packed calendar timestamp stored in every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CpuTimestamp(u32);

impl CpuTimestamp {
    /// Timestamp for the current UTC time.
    pub fn now() -> Result<Self> {
        Self::from_datetime(&Utc::now())
    }

    /// Pack a date-time, converted to UTC.
    ///
    /// # Errors
    ///
    /// Fails for years outside [`EPOCH_YEAR`]..=[`LAST_YEAR`].
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Result<Self> {
        let utc = dt.with_timezone(&Utc);
        let year = utc.year();
        if !(EPOCH_YEAR..=LAST_YEAR).contains(&year) {
            return Err(AcqError::timestamp(format!(
                "year {year} outside {EPOCH_YEAR}..={LAST_YEAR}"
            )));
        }

        let raw = ((year - EPOCH_YEAR) as u32) << YEAR_SHIFT
            | utc.month0() << MONTH_SHIFT
            | utc.day() << DAY_SHIFT
            | utc.hour() << HOUR_SHIFT
            | utc.minute() << MINUTE_SHIFT
            // leap seconds are folded into 59
            | utc.second().min(59);
        Ok(Self(raw))
    }

    /// Wrap a raw word read from a file, validating every field.
    pub fn from_raw(raw: u32) -> Result<Self> {
        let ts = Self(raw);
        ts.to_datetime()?;
        Ok(ts)
    }

    /// The packed word.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Calendar year.
    pub fn year(&self) -> i32 {
        EPOCH_YEAR + ((self.0 >> YEAR_SHIFT) & YEAR_MASK) as i32
    }

    /// Month, 1-based.
    pub fn month(&self) -> u32 {
        ((self.0 >> MONTH_SHIFT) & MONTH_MASK) + 1
    }

    /// Day of month.
    pub fn day(&self) -> u32 {
        (self.0 >> DAY_SHIFT) & DAY_MASK
    }

    pub fn hour(&self) -> u32 {
        (self.0 >> HOUR_SHIFT) & HOUR_MASK
    }

    pub fn minute(&self) -> u32 {
        (self.0 >> MINUTE_SHIFT) & MINUTE_MASK
    }

    pub fn second(&self) -> u32 {
        self.0 & SECOND_MASK
    }

    /// Unpack into a UTC date-time.
    ///
    /// # Errors
    ///
    /// Fails if any field is out of range (e.g. month 13, February 30th).
    pub fn to_datetime(&self) -> Result<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(self.year(), self.month(), self.day())
            .ok_or_else(|| AcqError::timestamp(format!("invalid date in {:#010x}", self.0)))?;
        let naive = date
            .and_hms_opt(self.hour(), self.minute(), self.second())
            .ok_or_else(|| AcqError::timestamp(format!("invalid time in {:#010x}", self.0)))?;
        Ok(Utc.from_utc_datetime(&naive))
    }
}

impl std::fmt::Display for CpuTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}
