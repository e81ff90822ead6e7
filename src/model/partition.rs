//! Calendar-month partition keys.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use super::projection::ProjectionTable;

/// A calendar month, the partition key of both projection tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionMonth {
    year: i32,
    month: u32,
}

impl PartitionMonth {
    /// Returns `None` for a month outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Shift by a signed number of months, saturating at the calendar's
    /// representable range.
    pub fn plus_months(&self, months: i64) -> Self {
        let first = i64::from(NaiveDate::MIN.year()) * 12;
        let last = i64::from(NaiveDate::MAX.year()) * 12 + 11;
        let index = (i64::from(self.year) * 12 + i64::from(self.month) - 1)
            .saturating_add(months)
            .clamp(first, last);
        Self {
            // In range after the clamp.
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// First day of the month (inclusive lower bound).
    pub fn first_day(&self) -> NaiveDate {
        // Month is validated on construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the next month (exclusive upper bound).
    pub fn end_exclusive(&self) -> NaiveDate {
        self.plus_months(1).first_day()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        PartitionMonth::of(date) == *self
    }

    /// Physical partition name, e.g. `run_lineage_denormalized_y2026m03`.
    pub fn partition_name(&self, table: ProjectionTable) -> String {
        format!("{}_y{:04}m{:02}", table.table_name(), self.year, self.month)
    }

    /// Inverse of [`partition_name`](Self::partition_name); `None` for foreign names.
    pub fn from_partition_name(table: ProjectionTable, name: &str) -> Option<Self> {
        let suffix = name.strip_prefix(table.table_name())?.strip_prefix("_y")?;
        let (year, month) = suffix.split_once('m')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl fmt::Display for PartitionMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Size information for one physical partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStats {
    pub table: ProjectionTable,
    pub month: PartitionMonth,
    pub name: String,
    /// Planner row estimate (exact count for the in-memory backend).
    pub row_estimate: i64,
    /// On-disk size including indexes, when the backend knows it.
    pub size_bytes: Option<i64>,
}
