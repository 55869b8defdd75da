use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::TradeRecord;

const SECS_PER_DAY: i64 = 86_400;

/// Rolling period selected by the dashboard user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateWindow {
    #[serde(rename = "all")]
    All,
    #[default]
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl DateWindow {
    pub fn days(&self) -> Option<i64> {
        match self {
            DateWindow::All => None,
            DateWindow::Day => Some(1),
            DateWindow::Week => Some(7),
            DateWindow::Month => Some(30),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateWindow::All => "All Time",
            DateWindow::Day => "Last 24h",
            DateWindow::Week => "Last 7 days",
            DateWindow::Month => "Last 30 days",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateWindow::All => "all",
            DateWindow::Day => "1d",
            DateWindow::Week => "7d",
            DateWindow::Month => "30d",
        }
    }
}

impl FromStr for DateWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(DateWindow::All),
            "1d" => Ok(DateWindow::Day),
            "7d" => Ok(DateWindow::Week),
            "30d" => Ok(DateWindow::Month),
            other => Err(format!("Invalid period {other:?}. Use all, 1d, 7d or 30d")),
        }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything carrying a timestamp in epoch seconds.
pub trait Timestamped {
    fn timestamp_secs(&self) -> i64;
}

impl Timestamped for TradeRecord {
    fn timestamp_secs(&self) -> i64 {
        self.timestamp
    }
}

/// Lower bound of the window in epoch seconds, `None` for all time.
/// `now` is supplied by the caller so the result is reproducible.
pub fn cutoff_timestamp(window: DateWindow, now: i64) -> Option<i64> {
    window.days().map(|days| now - days * SECS_PER_DAY)
}

/// Keep records at or after `cutoff` (inclusive). Order is preserved.
pub fn filter_by_window<T: Timestamped + Clone>(records: &[T], cutoff: Option<i64>) -> Vec<T> {
    match cutoff {
        None => records.to_vec(),
        Some(cutoff) => records
            .iter()
            .filter(|r| r.timestamp_secs() >= cutoff)
            .cloned()
            .collect(),
    }
}

/// Calendar range `[start, end)` sent to the LLM provider's usage API.
///
/// All time means the current calendar month; rolling windows start on the
/// day containing the cutoff and end today.
pub fn usage_date_range(window: DateWindow, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let today = now.date_naive();
    match window.days() {
        None => month_bounds(today),
        Some(days) => ((now - Duration::days(days)).date_naive(), today),
    }
}

/// First day of `day`'s month and first day of the following month.
pub fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = day.with_day(1).unwrap_or(day);
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    let end = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start);
    (start, end)
}
