//! In-memory spreadsheet grids.
//!
//! Builders that consume workbooks work on [`Workbook`] rather than on the
//! reader directly, so tests can hand them literal grids.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::coerce::{parse_date, parse_number};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn text(value: &str) -> Self {
        Cell::Text(value.to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Header-style rendering: trimmed text, integral numbers without `.0`.
    pub fn label(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::DateTime(dt) => Some(dt.date()),
            Cell::Text(s) => parse_date(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            Cell::Text(s) => parse_number(s),
            _ => None,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Float(v) => Cell::Number(*v),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
                .map(Cell::DateTime)
                .unwrap_or(Cell::Empty),
            Data::DateTimeIso(s) => Cell::Text(s.clone()),
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// Excel's 1900 date system counts days from 1899-12-30.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { name: name.into(), rows }
    }

    /// Drop rows and columns that contain nothing but empty cells.
    pub fn compact(&self) -> Sheet {
        let rows: Vec<&Vec<Cell>> = self
            .rows
            .iter()
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .collect();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let keep: Vec<usize> = (0..width)
            .filter(|&j| rows.iter().any(|r| r.get(j).is_some_and(|c| !c.is_empty())))
            .collect();

        let rows = rows
            .into_iter()
            .map(|row| {
                keep.iter()
                    .map(|&j| row.get(j).cloned().unwrap_or(Cell::Empty))
                    .collect()
            })
            .collect();
        Sheet { name: self.name.clone(), rows }
    }

    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(Cell::is_empty))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Read every sheet of an `.xlsx`/`.xls`/`.ods` file into memory.
pub fn load_workbook(path: &Path) -> Result<Workbook> {
    if !path.exists() {
        return Err(PipelineError::SourceNotFound { path: path.to_path_buf() });
    }

    let mut reader = open_workbook_auto(path)?;
    let mut sheets = Vec::new();
    for name in reader.sheet_names() {
        let range = reader.worksheet_range(&name)?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();
        sheets.push(Sheet::new(name, rows));
    }

    log::info!("loaded workbook {} ({} sheets)", path.display(), sheets.len());
    Ok(Workbook::new(sheets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_drops_empty_rows_and_columns() {
        let sheet = Sheet::new(
            "Jan",
            vec![
                vec![Cell::Empty, Cell::Empty, Cell::Empty],
                vec![Cell::Empty, Cell::text("Date"), Cell::text("Fuel")],
                vec![Cell::Empty, Cell::text(" "), Cell::Empty],
                vec![Cell::Empty, Cell::text("01/01/2024"), Cell::text("Wind")],
            ],
        );
        let compact = sheet.compact();
        assert_eq!(compact.rows.len(), 2);
        assert_eq!(compact.rows[0], vec![Cell::text("Date"), Cell::text("Fuel")]);
    }

    #[test]
    fn labels_render_integral_numbers_plainly() {
        assert_eq!(Cell::Number(2022.0).label(), "2022");
        assert_eq!(Cell::Number(1.5).label(), "1.5");
        assert_eq!(Cell::text("  Total ").label(), "Total");
    }

    #[test]
    fn excel_serial_dates_convert() {
        let dt = excel_serial_to_datetime(45292.5).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(dt.format("%H:%M").to_string(), "12:00");
    }

    #[test]
    fn cells_coerce_to_dates_and_numbers() {
        assert_eq!(
            Cell::text("01/02/2024").as_date(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(Cell::Number(45292.0).as_date(), None);
        assert_eq!(Cell::text("1,200").as_f64(), Some(1200.0));
        assert_eq!(Cell::Empty.as_f64(), None);
    }
}
