//! Value coercion for raw cells.
//!
//! Parsers return `None` on failure; the `require_*` helpers turn that into a
//! row-level [`PipelineError::ValueCoercion`] so builders can count and skip.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{PipelineError, Result};

/// Canonical on-disk date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parse a calendar day, dropping any time-of-day component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
}

/// Parse a finite number, tolerating thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an hour label such as `1`, `01`, `13.0` or `01:00`.
pub fn parse_hour(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let head = raw.split(':').next().unwrap_or(raw);
    if let Ok(hour) = head.parse::<i64>() {
        return Some(hour);
    }
    parse_number(head).filter(|v| v.fract() == 0.0).map(|v| v as i64)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn require_date(origin: &str, column: &str, raw: &str) -> Result<NaiveDate> {
    parse_date(raw).ok_or_else(|| coercion(origin, column, raw))
}

pub fn require_number(origin: &str, column: &str, raw: &str) -> Result<f64> {
    parse_number(raw).ok_or_else(|| coercion(origin, column, raw))
}

fn coercion(origin: &str, column: &str, raw: &str) -> PipelineError {
    PipelineError::ValueCoercion {
        origin: origin.to_string(),
        column: column.to_string(),
        value: raw.to_string(),
    }
}

/// Tally of rows excluded by coercion failures, reported once per source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DroppedRows {
    pub count: usize,
}

impl DroppedRows {
    /// Swallow row-level errors, propagate everything else.
    pub fn absorb<T>(&mut self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_row_level() => {
                log::debug!("dropping row: {}", err);
                self.count += 1;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn report(&self, origin: &str) {
        if self.count > 0 {
            log::warn!("{}: dropped {} rows that failed value coercion", origin, self.count);
        }
    }
}
