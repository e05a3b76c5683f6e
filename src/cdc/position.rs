//! Change-log positions
//!
//! Positions are source specific. Postgres-style sources use a single 64-bit
//! log sequence number, binlog sources a file name plus byte offset. Both
//! are totally ordered and round-trip through their text form.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// An ordered marker into a source's change log
pub trait CdcPosition:
    Clone + Ord + fmt::Debug + fmt::Display + FromStr<Err = Error> + Send + Sync + 'static
{
    /// Monotonic integer view of the position, emitted with each change record
    fn cursor_value(&self) -> i64;

    /// Retention unit holding this position, if the source retains the log in units
    fn retention_unit(&self) -> Option<&str> {
        None
    }
}

// ============================================================================
// LSN
// ============================================================================

/// 64-bit log sequence number, written as `XX/XXXXXXXX`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(pub u64);

impl Lsn {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (high, low) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::cdc_position(s, "expected XX/XXXXXXXX"))?;
        let parse = |part: &str| {
            u64::from_str_radix(part, 16)
                .map_err(|e| Error::cdc_position(s, format!("invalid hex '{part}': {e}")))
        };
        let (high, low) = (parse(high)?, parse(low)?);
        if high > u64::from(u32::MAX) || low > u64::from(u32::MAX) {
            return Err(Error::cdc_position(s, "LSN halves must fit in 32 bits"));
        }
        Ok(Self((high << 32) | low))
    }
}

impl CdcPosition for Lsn {
    fn cursor_value(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

// ============================================================================
// Binlog position
// ============================================================================

/// Numeric suffix of a binlog file name: mysql-bin.000042
static BINLOG_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(\d+)$").unwrap());

/// Binlog file name and byte offset, written as `file:offset`
///
/// Ordered by the file's numeric suffix, then by offset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BinlogPosition {
    sequence: u64,
    file_name: String,
    position: u64,
}

impl BinlogPosition {
    /// Create a position, parsing the file's sequence number
    pub fn new(file_name: impl Into<String>, position: u64) -> Result<Self> {
        let file_name = file_name.into();
        let sequence = BINLOG_SEQUENCE
            .captures(&file_name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .ok_or_else(|| {
                Error::cdc_position(&file_name, "binlog file name has no numeric suffix")
            })?;
        Ok(Self {
            sequence,
            file_name,
            position,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.position)
    }
}

impl FromStr for BinlogPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (file, position) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| Error::cdc_position(s, "expected file:offset"))?;
        let position = position
            .parse::<u64>()
            .map_err(|e| Error::cdc_position(s, format!("invalid offset: {e}")))?;
        Self::new(file, position)
    }
}

impl CdcPosition for BinlogPosition {
    fn cursor_value(&self) -> i64 {
        let value = (self.sequence << 32) | (self.position & 0xFFFF_FFFF);
        i64::try_from(value).unwrap_or(i64::MAX)
    }

    fn retention_unit(&self) -> Option<&str> {
        Some(&self.file_name)
    }
}
