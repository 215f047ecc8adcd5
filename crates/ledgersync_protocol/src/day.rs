//! Day partitioning of records into transfer units.
//!
//! The remote store keeps one transfer unit per calendar day, named
//! `yyyy-MM-dd.csv`. After a local change only the days it touched need to
//! be rewritten.

use crate::record::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

const DAY_FORMAT: &str = "%Y-%m-%d";
const UNIT_EXTENSION: &str = ".csv";

/// A calendar day identifying one transfer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Creates a key for the given date.
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Returns the key of a record's day.
    pub fn of(record: &Record) -> Self {
        Self(record.date)
    }

    /// Returns the date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_FORMAT))
    }
}

impl FromStr for DayKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, DAY_FORMAT).map(Self)
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

/// Groups records by day. Soft-deleted records are included.
pub fn group_by_day(records: &[Record]) -> BTreeMap<DayKey, Vec<Record>> {
    let mut groups: BTreeMap<DayKey, Vec<Record>> = BTreeMap::new();
    for record in records {
        groups.entry(DayKey::of(record)).or_default().push(record.clone());
    }
    groups
}

/// Returns the transfer unit file name for a day.
pub fn filename_for_day(day: DayKey) -> String {
    format!("{day}{UNIT_EXTENSION}")
}

/// Parses a transfer unit file name back into its day.
///
/// Leading directories are ignored. Only the canonical
/// `yyyy-MM-dd.csv` form is accepted.
pub fn day_key_from_filename(filename: &str) -> Option<DayKey> {
    let name = filename.rsplit(['/', '\\']).next()?;
    let stem = name.strip_suffix(UNIT_EXTENSION)?;
    if stem.len() != 10 {
        return None;
    }
    let day: DayKey = stem.parse().ok()?;
    (day.to_string() == stem).then_some(day)
}

/// Returns the unique days of `changed`, ascending.
pub fn affected_days(changed: &[Record]) -> Vec<DayKey> {
    changed
        .iter()
        .map(DayKey::of)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Returns the days whose transfer unit differs between two record sets.
///
/// A record that changed marks its day in both sets, so moving a record to
/// another date rewrites the day it left as well as the day it joined.
pub fn changed_days(before: &[Record], after: &[Record]) -> Vec<DayKey> {
    let before_by_id: BTreeMap<&str, &Record> =
        before.iter().map(|r| (r.id.as_str(), r)).collect();
    let after_by_id: BTreeMap<&str, &Record> = after.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut days = BTreeSet::new();
    for (id, old) in &before_by_id {
        match after_by_id.get(id) {
            Some(new) if new == old => {}
            Some(new) => {
                days.insert(DayKey::of(old));
                days.insert(DayKey::of(new));
            }
            None => {
                days.insert(DayKey::of(old));
            }
        }
    }
    for (id, new) in &after_by_id {
        if !before_by_id.contains_key(id) {
            days.insert(DayKey::of(new));
        }
    }

    days.into_iter().collect()
}
