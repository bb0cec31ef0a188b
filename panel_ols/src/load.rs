//! Daily system load from per-day load CSVs.
//!
//! Each file either carries a total-load column or one numeric column per
//! weather zone; zone files are summed row-wise into a total before the daily
//! mean is taken across all intraday rows.

use std::path::Path;

use polars::prelude::*;

use crate::coerce::{format_date, parse_number, require_date, require_number, DroppedRows};
use crate::error::{PipelineError, Result};
use crate::io::{column_names, float_values, is_numeric_column, read_csv, string_values};
use crate::models::{DailyPanel, PanelKind, DATE, LOAD};
use crate::schema::{ColumnSchema, MatchPolicy, Role};

const RAW_LOAD: &str = "Load";

pub fn load_schema() -> ColumnSchema {
    ColumnSchema::new(MatchPolicy::Exact)
        .required(Role::Date, &["operday", "date", "delivery date", "operating day"])
        .optional(Role::Hour, &["hourending", "hour ending", "delivery hour", "hour"])
        .optional(
            Role::Total,
            &["total", "system load", "load (mw)", "load", "actual load (mw)"],
        )
        .optional(Role::DstFlag, &["dstflag", "dst flag"])
        .optional(Role::TimeZone, &["timezone", "time zone"])
}

/// How a file's total load was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    Total(String),
    Zones(Vec<String>),
}

#[derive(Default)]
pub struct LoadPanelBuilder {
    frames: Vec<DataFrame>,
}

impl LoadPanelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files_added(&self) -> usize {
        self.frames.len()
    }

    pub fn add_file(&mut self, path: &Path) -> Result<LoadSource> {
        let df = read_csv(path)?;
        self.add_frame(&path.display().to_string(), &df)
    }

    /// Normalize one raw table into `(date, Load)` rows and stage it.
    pub fn add_frame(&mut self, origin: &str, df: &DataFrame) -> Result<LoadSource> {
        let columns = column_names(df);
        let map = load_schema()
            .resolve(&columns)
            .map_err(|m| PipelineError::schema(origin, m))?;

        let (loads, source) = match map.get(Role::Total) {
            Some(total) => (load_cells(origin, df, total)?, LoadSource::Total(total.to_string())),
            None => {
                let claimed: Vec<&str> = map.labels().collect();
                let mut zones = Vec::new();
                for column in &columns {
                    if !claimed.contains(&column.as_str()) && is_number_like(df, column)? {
                        zones.push(column.clone());
                    }
                }
                if zones.is_empty() {
                    return Err(PipelineError::SchemaMismatch {
                        origin: origin.to_string(),
                        missing: vec!["load or numeric zone columns".to_string()],
                        available: columns,
                    });
                }
                (sum_zones(origin, df, &zones)?, LoadSource::Zones(zones))
            }
        };

        let date_col = map.get(Role::Date).unwrap_or(DATE);
        let raw_dates = string_values(df, date_col)?;

        let mut dates = Vec::with_capacity(raw_dates.len());
        let mut values = Vec::with_capacity(raw_dates.len());
        let mut dropped = DroppedRows::default();
        for (raw, load) in raw_dates.into_iter().zip(loads) {
            let parsed = require_date(origin, date_col, raw.as_deref().unwrap_or(""))
                .and_then(|date| load.map(|load| (date, load)));
            if let Some((date, load)) = dropped.absorb(parsed)? {
                dates.push(format_date(date));
                values.push(load);
            }
        }
        dropped.report(origin);

        log::debug!("{}: {} rows via {:?}", origin, dates.len(), source);
        self.frames.push(df!(DATE => dates, RAW_LOAD => values)?);
        Ok(source)
    }

    /// Concatenate all staged files and average per date.
    pub fn finish(self) -> Result<DailyPanel> {
        if self.frames.is_empty() {
            return Err(PipelineError::NoUsableData("no load files were added".to_string()));
        }

        let lazy: Vec<LazyFrame> = self.frames.into_iter().map(|df| df.lazy()).collect();
        let daily = concat(lazy.as_slice(), UnionArgs::default())?
            .group_by([col(DATE)])
            .agg([col(RAW_LOAD).mean().alias(LOAD)])
            .collect()?;

        if daily.height() == 0 {
            return Err(PipelineError::NoUsableData("load files contained no dated rows".to_string()));
        }

        let panel = DailyPanel::new(PanelKind::Load, daily)?;
        log::info!("load panel: {} days", panel.height());
        Ok(panel)
    }
}

/// Per-row readings of one load column. A blank cell is a missing reading;
/// text that is not a number is a coercion failure for that row.
fn load_cells(origin: &str, df: &DataFrame, column: &str) -> Result<Vec<Result<Option<f64>>>> {
    if is_numeric_column(df, column)? {
        return Ok(float_values(df, column)?.into_iter().map(Ok).collect());
    }
    Ok(string_values(df, column)?
        .into_iter()
        .map(|raw| match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => require_number(origin, column, text).map(Some),
        })
        .collect())
}

/// Numeric dtype, or text whose non-blank cells all read as numbers
/// (`"11,000"`).
fn is_number_like(df: &DataFrame, column: &str) -> Result<bool> {
    if is_numeric_column(df, column)? {
        return Ok(true);
    }
    if df.column(column)?.dtype() != &DataType::String {
        return Ok(false);
    }
    let mut seen = false;
    for raw in string_values(df, column)?.iter().flatten() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        if parse_number(raw).is_none() {
            return Ok(false);
        }
        seen = true;
    }
    Ok(seen)
}

/// Row-wise sum of the zone columns; a missing zone reading counts as zero.
fn sum_zones(origin: &str, df: &DataFrame, zones: &[String]) -> Result<Vec<Result<Option<f64>>>> {
    let mut totals: Vec<Result<f64>> = (0..df.height()).map(|_| Ok(0.0)).collect();
    for zone in zones {
        totals = totals
            .into_iter()
            .zip(load_cells(origin, df, zone)?)
            .map(|(total, cell)| Ok(total? + cell?.unwrap_or(0.0)))
            .collect();
    }
    Ok(totals.into_iter().map(|total| total.map(Some)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zone_columns_are_summed_per_hour() {
        let hours: Vec<String> = (1..=24).map(|h| format!("{:02}:00", h)).collect();
        let df = df!(
            "OperDay" => vec!["2024-01-01"; 24],
            "HourEnding" => hours,
            "COAST" => vec![1000.0; 24],
            "NORTH" => vec![500.0; 24],
            "DSTFlag" => vec!["N"; 24],
        )
        .unwrap();

        let mut builder = LoadPanelBuilder::new();
        let source = builder.add_frame("zones.csv", &df).unwrap();
        assert_eq!(source, LoadSource::Zones(vec!["COAST".to_string(), "NORTH".to_string()]));

        let staged = &builder.frames[0];
        assert_eq!(float_values(staged, RAW_LOAD).unwrap(), vec![Some(1500.0); 24]);

        let panel = builder.finish().unwrap();
        assert_eq!(panel.value_on("2024-01-01", LOAD).unwrap(), Some(1500.0));
    }

    #[test]
    fn text_total_with_thousands_separators_is_parsed_and_junk_rows_dropped() {
        let df = df!(
            "OperDay" => ["01/02/2024", "01/02/2024", "01/02/2024", "01/02/2024"],
            "Total" => ["41,000", "43,000", "n/a", ""],
        )
        .unwrap();
        let mut builder = LoadPanelBuilder::new();
        let source = builder.add_frame("total_text.csv", &df).unwrap();
        assert_eq!(source, LoadSource::Total("Total".to_string()));

        // "n/a" is dropped; the blank cell stays as a missing reading
        let staged = &builder.frames[0];
        assert_eq!(
            float_values(staged, RAW_LOAD).unwrap(),
            vec![Some(41000.0), Some(43000.0), None]
        );

        let panel = builder.finish().unwrap();
        assert_eq!(panel.value_on("2024-01-02", LOAD).unwrap(), Some(42000.0));
    }

    #[test]
    fn text_zone_with_thousands_separators_is_summed() {
        let df = df!(
            "OperDay" => ["2024-01-01", "2024-01-01"],
            "HourEnding" => ["01:00", "02:00"],
            "COAST" => ["11,000", "12,000"],
            "NORTH" => [500.0, 500.0],
            "DSTFlag" => ["N", "N"],
        )
        .unwrap();
        let mut builder = LoadPanelBuilder::new();
        let source = builder.add_frame("zones_text.csv", &df).unwrap();
        assert_eq!(source, LoadSource::Zones(vec!["COAST".to_string(), "NORTH".to_string()]));

        let panel = builder.finish().unwrap();
        assert_eq!(panel.value_on("2024-01-01", LOAD).unwrap(), Some(12000.0));
    }

    #[test]
    fn numeric_hour_column_is_not_a_zone() {
        let df = df!(
            "OperDay" => ["01/01/2024", "01/01/2024"],
            "HourEnding" => [1i64, 2],
            "COAST" => [100.0, 300.0],
        )
        .unwrap();
        let mut builder = LoadPanelBuilder::new();
        builder.add_frame("numeric_hours.csv", &df).unwrap();
        let panel = builder.finish().unwrap();
        assert_eq!(panel.value_on("2024-01-01", LOAD).unwrap(), Some(200.0));
    }

    #[test]
    fn daily_mean_averages_hourly_zone_sums() {
        let hours: Vec<i64> = (1..=24).collect();
        let coast: Vec<f64> = (1..=24).map(|h| 1000.0 + h as f64).collect();
        let df = df!(
            "OperDay" => vec!["2024-01-01"; 24],
            "HourEnding" => hours,
            "COAST" => coast,
            "NORTH" => vec![500.0; 24],
        )
        .unwrap();
        let mut builder = LoadPanelBuilder::new();
        builder.add_frame("ramp.csv", &df).unwrap();
        let panel = builder.finish().unwrap();
        // mean(1001..=1024) + 500
        assert_relative_eq!(
            panel.value_on("2024-01-01", LOAD).unwrap().unwrap(),
            1012.5 + 500.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn total_column_is_used_directly() {
        let df = df!(
            "Date" => ["2024-01-02", "2024-01-02"],
            "Hour" => [1i64, 2],
            "COAST" => [1.0, 1.0],
            "Total" => [40000.0, 42000.0],
        )
        .unwrap();
        let mut builder = LoadPanelBuilder::new();
        let source = builder.add_frame("total.csv", &df).unwrap();
        assert_eq!(source, LoadSource::Total("Total".to_string()));
        let panel = builder.finish().unwrap();
        assert_eq!(panel.value_on("2024-01-02", LOAD).unwrap(), Some(41000.0));
    }

    #[test]
    fn files_for_the_same_day_are_averaged_together() {
        let a = df!("OperDay" => ["2024-01-01"], "Total" => [100.0]).unwrap();
        let b = df!("OperDay" => ["2024-01-01", "2024-01-02"], "Total" => [200.0, 50.0]).unwrap();
        let mut builder = LoadPanelBuilder::new();
        builder.add_frame("a.csv", &a).unwrap();
        builder.add_frame("b.csv", &b).unwrap();
        let panel = builder.finish().unwrap();
        assert_eq!(panel.dates().unwrap(), vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(panel.value_on("2024-01-01", LOAD).unwrap(), Some(150.0));
    }

    #[test]
    fn file_without_load_or_zones_names_file_and_columns() {
        let df = df!("OperDay" => ["2024-01-01"], "Note" => ["maintenance"]).unwrap();
        let err = LoadPanelBuilder::new().add_frame("empty_zones.csv", &df).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("empty_zones.csv"));
        assert!(msg.contains("Note"));
    }

    #[test]
    fn file_without_date_is_schema_mismatch() {
        let df = df!("Hour" => [1i64], "Total" => [1.0]).unwrap();
        let err = LoadPanelBuilder::new().add_frame("nodate.csv", &df).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn finishing_without_files_is_no_usable_data() {
        assert!(matches!(
            LoadPanelBuilder::new().finish().unwrap_err(),
            PipelineError::NoUsableData(_)
        ));
    }
}
