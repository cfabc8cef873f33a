//! Time-window selection and timestamp ordering.
//!
//! Entry timestamps are ISO-8601 strings. RFC 3339 values carry their own
//! offset; bare local date-times are read in the offset of the `now` instant
//! the caller supplies, which stands in for the viewer's local time zone.

use crate::error::{AuditError, Result};
use crate::schema::AuditEntry;
use std::cmp::Ordering;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeWindow {
    #[default]
    All,
    MonthToDate,
    Today,
}

impl TimeWindow {
    /// Start of the period containing `now`, in `now`'s offset. `None` means unbounded.
    pub fn start(self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        let midnight = now.replace_time(Time::MIDNIGHT);
        match self {
            TimeWindow::All => None,
            TimeWindow::Today => Some(midnight),
            TimeWindow::MonthToDate => Some(midnight.replace_day(1).unwrap_or(midnight)),
        }
    }

    /// Entries whose timestamp falls in `[start, now]`. Input order is kept.
    ///
    /// Entries with unreadable timestamps are only part of the unbounded window.
    pub fn select<'a>(self, entries: &'a [AuditEntry], now: OffsetDateTime) -> Vec<&'a AuditEntry> {
        entries
            .iter()
            .filter(|entry| self.includes(entry, now))
            .collect()
    }

    pub fn includes(self, entry: &AuditEntry, now: OffsetDateTime) -> bool {
        let Some(start) = self.start(now) else {
            return true;
        };
        parse_timestamp(&entry.timestamp, now.offset()).is_some_and(|ts| ts >= start && ts <= now)
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::All => "All Time",
            TimeWindow::MonthToDate => "Month-to-Date",
            TimeWindow::Today => "Today",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = AuditError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "all" => Ok(TimeWindow::All),
            "mtd" | "month-to-date" | "month" => Ok(TimeWindow::MonthToDate),
            "today" => Ok(TimeWindow::Today),
            _ => Err(AuditError::InvalidArgument(format!(
                "unknown time window '{value}' (expected all, mtd or today)"
            ))),
        }
    }
}

pub fn parse_timestamp(raw: &str, local: UtcOffset) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    let with_fraction =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let without_fraction = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, with_fraction)
        .or_else(|_| PrimitiveDateTime::parse(raw, without_fraction))
        .ok()
        .map(|naive| naive.assume_offset(local))
}

/// Newest first. Unreadable timestamps sort last; ties keep input order.
pub fn sort_newest_first(entries: &mut [AuditEntry], local: UtcOffset) {
    entries.sort_by(|a, b| compare_newest_first(a, b, local));
}

pub fn sort_refs_newest_first(entries: &mut [&AuditEntry], local: UtcOffset) {
    entries.sort_by(|a, b| compare_newest_first(a, b, local));
}

fn compare_newest_first(a: &AuditEntry, b: &AuditEntry, local: UtcOffset) -> Ordering {
    match (
        parse_timestamp(&a.timestamp, local),
        parse_timestamp(&b.timestamp, local),
    ) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
