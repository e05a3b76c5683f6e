//! GTID sets
//!
//! A GTID set maps each source server UUID to the transaction numbers it
//! executed, as inclusive intervals: `uuid:1-5:7,uuid2:1-100`.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Inclusive interval of transaction numbers
type Interval = (u64, u64);

/// Normalized set of global transaction identifiers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GtidSet {
    sources: BTreeMap<String, Vec<Interval>>,
}

impl GtidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Add an inclusive range of transactions for a source
    pub fn add(&mut self, uuid: &str, start: u64, end: u64) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let intervals = self.sources.entry(uuid.to_lowercase()).or_default();
        intervals.push((start, end));
        normalize(intervals);
    }

    /// Whether one transaction is in the set
    pub fn contains(&self, uuid: &str, transaction: u64) -> bool {
        self.sources
            .get(&uuid.to_lowercase())
            .is_some_and(|intervals| {
                intervals
                    .iter()
                    .any(|&(start, end)| start <= transaction && transaction <= end)
            })
    }

    /// Whether every transaction in this set is also in `other`
    pub fn is_contained_within(&self, other: &GtidSet) -> bool {
        self.sources.iter().all(|(uuid, intervals)| {
            let Some(theirs) = other.sources.get(uuid) else {
                return false;
            };
            intervals.iter().all(|&(start, end)| {
                theirs
                    .iter()
                    .any(|&(s, e)| s <= start && end <= e)
            })
        })
    }

    /// Transactions in this set but not in `other`
    #[must_use]
    pub fn subtract(&self, other: &GtidSet) -> GtidSet {
        let mut sources = BTreeMap::new();
        for (uuid, intervals) in &self.sources {
            let remaining = match other.sources.get(uuid) {
                Some(theirs) => subtract_intervals(intervals, theirs),
                None => intervals.clone(),
            };
            if !remaining.is_empty() {
                sources.insert(uuid.clone(), remaining);
            }
        }
        GtidSet { sources }
    }

    /// Whether the sets share any transaction
    pub fn intersects(&self, other: &GtidSet) -> bool {
        self.sources.iter().any(|(uuid, intervals)| {
            other.sources.get(uuid).is_some_and(|theirs| {
                intervals.iter().any(|&(start, end)| {
                    theirs.iter().any(|&(s, e)| start <= e && s <= end)
                })
            })
        })
    }
}

fn normalize(intervals: &mut Vec<Interval>) {
    intervals.sort_unstable();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for &(start, end) in intervals.iter() {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    *intervals = merged;
}

fn subtract_intervals(ours: &[Interval], theirs: &[Interval]) -> Vec<Interval> {
    let mut remaining = Vec::new();
    for &(start, end) in ours {
        let mut pieces = vec![(start, end)];
        for &(s, e) in theirs {
            pieces = pieces
                .into_iter()
                .flat_map(|(ps, pe)| {
                    if e < ps || pe < s {
                        return vec![(ps, pe)];
                    }
                    let mut left = Vec::with_capacity(2);
                    if ps < s {
                        left.push((ps, s - 1));
                    }
                    if e < pe {
                        left.push((e + 1, pe));
                    }
                    left
                })
                .collect();
        }
        remaining.extend(pieces);
    }
    remaining
}

impl FromStr for GtidSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut set = GtidSet::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split(':');
            let uuid = parts
                .next()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| Error::cdc_position(s, "GTID entry without source UUID"))?;
            let mut any = false;
            for range in parts {
                let (start, end) = match range.split_once('-') {
                    Some((start, end)) => (parse_number(s, start)?, parse_number(s, end)?),
                    None => {
                        let n = parse_number(s, range)?;
                        (n, n)
                    }
                };
                set.add(uuid, start, end);
                any = true;
            }
            if !any {
                return Err(Error::cdc_position(s, format!("GTID entry '{entry}' has no transactions")));
            }
        }
        Ok(set)
    }
}

fn parse_number(input: &str, part: &str) -> Result<u64> {
    part.trim()
        .parse()
        .map_err(|e| Error::cdc_position(input, format!("invalid transaction number '{part}': {e}")))
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (uuid, intervals)) in self.sources.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(uuid)?;
            for &(start, end) in intervals {
                if start == end {
                    write!(f, ":{start}")?;
                } else {
                    write!(f, ":{start}-{end}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562";
    const B: &str = "5b2e7c1d-0a3f-11ee-8c90-0242ac120002";

    fn set(s: &str) -> GtidSet {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_format() {
        let gtids = set(&format!("{}:1-5:7, {B}:1-3:4-9", A.to_uppercase()));
        assert_eq!(gtids.to_string(), format!("{A}:1-5:7,{B}:1-9"));
        assert!(gtids.contains(A, 7));
        assert!(!gtids.contains(A, 6));
        assert!(set("").is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(A.parse::<GtidSet>().is_err());
        assert!(format!("{A}:x-3").parse::<GtidSet>().is_err());
        assert!(":1-3".parse::<GtidSet>().is_err());
    }

    #[test]
    fn test_containment() {
        let executed = set(&format!("{A}:1-100,{B}:1-10"));
        assert!(set(&format!("{A}:1-50")).is_contained_within(&executed));
        assert!(set(&format!("{A}:1-50,{B}:5")).is_contained_within(&executed));
        assert!(!set(&format!("{A}:1-101")).is_contained_within(&executed));
        assert!(!set(&format!("{A}:1-5:7,{}:1", "other")).is_contained_within(&executed));
        assert!(GtidSet::new().is_contained_within(&executed));
    }

    #[test]
    fn test_subtract_and_intersect() {
        let executed = set(&format!("{A}:1-100,{B}:1-10"));
        let seen = set(&format!("{A}:1-40:61-70,{B}:1-10"));
        let unseen = executed.subtract(&seen);
        assert_eq!(unseen.to_string(), format!("{A}:41-60:71-100"));

        assert!(unseen.intersects(&set(&format!("{A}:1-41"))));
        assert!(!unseen.intersects(&set(&format!("{A}:1-40:61-70"))));
        assert!(!unseen.intersects(&set(&format!("{B}:1-100"))));
    }
}
