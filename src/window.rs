//! Inclusive calendar-date windows over timestamped records

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::{col, lit, LazyFrame};
use tracing::debug;

use crate::data::{to_micros, Timestamped, MICROS_PER_DAY, PURCHASE_TIMESTAMP};
use crate::error::RfmError;

/// An inclusive `[start, end]` calendar date range.
///
/// A window whose start lies after its end is valid and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Build a window from two `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, RfmError> {
        Ok(Self::new(parse_date(start)?, parse_date(end)?))
    }

    /// The smallest window covering every record, or `None` for no records
    pub fn spanning<T: Timestamped>(rows: &[T]) -> Option<Self> {
        let mut dates = rows.iter().map(|row| row.purchased_at().date());
        let first = dates.next()?;
        let (start, end) = dates.fold((first, first), |(lo, hi), date| (lo.min(date), hi.max(date)));
        Some(Self::new(start, end))
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Whether the timestamp falls on a day inside the window
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let date = timestamp.date();
        self.start <= date && date <= self.end
    }

    /// Borrow the records that fall inside the window, in input order
    pub fn filter<'a, T: Timestamped>(&self, rows: &'a [T]) -> Vec<&'a T> {
        let kept: Vec<&T> = rows
            .iter()
            .filter(|row| self.contains(row.purchased_at()))
            .collect();
        debug!(window = %self, total = rows.len(), kept = kept.len(), "window filter");
        kept
    }

    /// Midnight opening the end day, in epoch microseconds
    pub(crate) fn end_micros(&self) -> i64 {
        to_micros(self.end.and_time(NaiveTime::MIN))
    }

    /// Keep the frame rows whose `order_purchase_timestamp` falls on a day
    /// inside the window
    pub fn filter_frame(&self, frame: LazyFrame) -> LazyFrame {
        let from = to_micros(self.start.and_time(NaiveTime::MIN));
        let until = self.end_micros() + MICROS_PER_DAY;
        frame.filter(
            col(PURCHASE_TIMESTAMP)
                .gt_eq(lit(from))
                .and(col(PURCHASE_TIMESTAMP).lt(lit(until))),
        )
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RfmError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| RfmError::InvalidDate {
        value: value.to_string(),
    })
}
