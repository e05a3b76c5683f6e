//! Typed checkpoint and bound values
//!
//! Checkpoint columns, partition bounds and persisted state all use
//! `CursorValue`. The persisted form is a string whose decoding depends on
//! the column's `FieldType`.

use crate::catalog::FieldType;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::fmt;

/// Canonical persisted format for timestamps without zone
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Canonical persisted format for timestamps with zone
pub const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
];

/// A single typed value of an orderable column
#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Binary(Vec<u8>),
}

impl CursorValue {
    /// Decode a JSON value read from the source, `None` for SQL NULL
    pub fn from_json(field_type: FieldType, value: &JsonValue) -> Result<Option<Self>> {
        if value.is_null() {
            return Ok(None);
        }
        let invalid = |message: &str| Error::decode(field_type, value.to_string(), message);

        let decoded = match field_type {
            FieldType::Boolean => match value {
                JsonValue::Bool(b) => CursorValue::Boolean(*b),
                JsonValue::String(s) => CursorValue::Boolean(
                    s.parse::<bool>().map_err(|_| invalid("not a boolean"))?,
                ),
                JsonValue::Number(n) => CursorValue::Boolean(n.as_i64() != Some(0)),
                _ => return Err(invalid("not a boolean")),
            },
            FieldType::Integer => match value {
                JsonValue::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        CursorValue::Integer(i)
                    } else {
                        match n.as_f64() {
                            Some(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => {
                                CursorValue::Integer(f as i64)
                            }
                            _ => return Err(invalid("integer out of range")),
                        }
                    }
                }
                JsonValue::String(s) => CursorValue::Integer(
                    s.trim()
                        .parse::<i64>()
                        .map_err(|e| invalid(&e.to_string()))?,
                ),
                _ => return Err(invalid("not an integer")),
            },
            FieldType::Number => match value {
                JsonValue::Number(n) => {
                    CursorValue::Number(n.as_f64().ok_or_else(|| invalid("not a number"))?)
                }
                JsonValue::String(s) => CursorValue::Number(
                    s.trim()
                        .parse::<f64>()
                        .map_err(|e| invalid(&e.to_string()))?,
                ),
                _ => return Err(invalid("not a number")),
            },
            FieldType::String => match value {
                JsonValue::String(s) => CursorValue::String(s.clone()),
                JsonValue::Number(_) | JsonValue::Bool(_) => {
                    CursorValue::String(value.to_string())
                }
                _ => return Err(invalid("not a string")),
            },
            FieldType::Date => {
                let s = value.as_str().ok_or_else(|| invalid("expected a date string"))?;
                CursorValue::Date(parse_date(s).ok_or_else(|| invalid("unrecognized date"))?)
            }
            FieldType::TimestampWithoutTimezone => {
                let s = value
                    .as_str()
                    .ok_or_else(|| invalid("expected a timestamp string"))?;
                CursorValue::Timestamp(
                    parse_naive_timestamp(s).ok_or_else(|| invalid("unrecognized timestamp"))?,
                )
            }
            FieldType::TimestampWithTimezone => {
                let s = value
                    .as_str()
                    .ok_or_else(|| invalid("expected a timestamp string"))?;
                CursorValue::TimestampTz(
                    parse_offset_timestamp(s)
                        .ok_or_else(|| invalid("unrecognized timestamp"))?,
                )
            }
            FieldType::Binary => {
                let s = value
                    .as_str()
                    .ok_or_else(|| invalid("expected base64 text"))?;
                CursorValue::Binary(BASE64.decode(s).map_err(|e| invalid(&e.to_string()))?)
            }
            FieldType::Json => return Err(invalid("json values cannot be used as a checkpoint")),
        };
        Ok(Some(decoded))
    }

    /// Decode a persisted state string
    pub fn parse(field_type: FieldType, s: &str) -> Result<Self> {
        Self::from_json(field_type, &JsonValue::String(s.to_string()))?
            .ok_or_else(|| Error::decode(field_type, s, "unexpected null"))
    }

    /// JSON representation, as used in rows and query bounds
    pub fn to_json(&self) -> JsonValue {
        match self {
            CursorValue::Boolean(b) => JsonValue::Bool(*b),
            CursorValue::Integer(i) => JsonValue::from(*i),
            CursorValue::Number(f) => serde_json::Number::from_f64(*f)
                .map_or(JsonValue::Null, JsonValue::Number),
            _ => JsonValue::String(self.to_string()),
        }
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorValue::Boolean(b) => write!(f, "{b}"),
            CursorValue::Integer(i) => write!(f, "{i}"),
            CursorValue::Number(n) => write!(f, "{n}"),
            CursorValue::String(s) => f.write_str(s),
            CursorValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            CursorValue::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            CursorValue::TimestampTz(ts) => write!(f, "{}", ts.format(TIMESTAMP_TZ_FORMAT)),
            CursorValue::Binary(bytes) => f.write_str(&BASE64.encode(bytes)),
        }
    }
}

impl PartialOrd for CursorValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use CursorValue as V;
        match (self, other) {
            (V::Boolean(a), V::Boolean(b)) => a.partial_cmp(b),
            (V::Integer(a), V::Integer(b)) => a.partial_cmp(b),
            (V::Number(a), V::Number(b)) => a.partial_cmp(b),
            (V::Integer(a), V::Number(b)) => (*a as f64).partial_cmp(b),
            (V::Number(a), V::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (V::String(a), V::String(b)) => a.partial_cmp(b),
            (V::Date(a), V::Date(b)) => a.partial_cmp(b),
            (V::Timestamp(a), V::Timestamp(b)) => a.partial_cmp(b),
            (V::TimestampTz(a), V::TimestampTz(b)) => a.partial_cmp(b),
            (V::Binary(a), V::Binary(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Lexicographic comparison of two checkpoint tuples
///
/// `None` when the tuples have different arity or a pair is not comparable.
pub fn compare_tuples(a: &[CursorValue], b: &[CursorValue]) -> Option<Ordering> {
    if a.len() != b.len() {
        return None;
    }
    for (x, y) in a.iter().zip(b) {
        match x.partial_cmp(y)? {
            Ordering::Equal => continue,
            ordering => return Some(ordering),
        }
    }
    Some(Ordering::Equal)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_naive_timestamp(s).map(|ts| ts.date()))
}

fn parse_naive_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| parse_explicit_offset(s).map(|ts| ts.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_explicit_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        OFFSET_TIMESTAMP_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(s, format).ok())
    })
}

/// Timestamps with zone; values without an offset are taken as UTC
fn parse_offset_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    parse_explicit_offset(s).or_else(|| {
        NAIVE_TIMESTAMP_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
            .map(|ts| ts.and_utc().fixed_offset())
    })
}
