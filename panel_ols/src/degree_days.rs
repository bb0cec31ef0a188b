//! Cooling and heating degree-days from the long weather table.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::coerce::{format_date, require_date, DroppedRows};
use crate::error::{PipelineError, Result};
use crate::io::{column_names, float_values, read_csv, string_values};
use crate::models::{DailyPanel, PanelKind, CDD, DATE, HDD};
use crate::schema::{ColumnSchema, MatchPolicy, Role};

const DATATYPE: &str = "datatype";
const VALUE: &str = "value";

const TMAX: &str = "TMAX";
const TMIN: &str = "TMIN";
const TAVG: &str = "TAVG";
const SOURCE_CDD: &str = "CDD";
const SOURCE_HDD: &str = "HDD";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegreeDayConfig {
    /// Comfort baseline in the temperature's own units.
    pub base_temperature: f64,
    /// Median |value| above which a temperature column is read as tenths.
    pub tenths_threshold: f64,
}

impl Default for DegreeDayConfig {
    fn default() -> Self {
        Self { base_temperature: 65.0, tenths_threshold: 200.0 }
    }
}

pub fn weather_schema() -> ColumnSchema {
    ColumnSchema::new(MatchPolicy::Exact)
        .required(Role::Date, &["date"])
        .required(Role::Category, &["datatype", "data type", "element"])
        .required(Role::Value, &["value"])
        .optional(Role::Zone, &["zone"])
}

/// A temperature column after the tenths-of-a-degree check.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleCorrection {
    pub values: Vec<Option<f64>>,
    pub corrected: bool,
}

/// Divide by ten when the median absolute value exceeds `threshold`.
///
/// Already-corrected columns have a median at or below the threshold, so
/// applying this twice changes nothing the second time.
pub fn correct_tenths_scale(values: &[Option<f64>], threshold: f64) -> ScaleCorrection {
    let mut magnitudes: Vec<f64> = values.iter().flatten().map(|v| v.abs()).collect();
    let corrected = match median(&mut magnitudes) {
        Some(m) => m > threshold,
        None => false,
    };
    let values = if corrected {
        values.iter().map(|v| v.map(|x| x / 10.0)).collect()
    } else {
        values.to_vec()
    };
    ScaleCorrection { values, corrected }
}

/// Mean of daily max and min, null where either is missing.
pub fn midpoint_temperature(tmax: &[Option<f64>], tmin: &[Option<f64>]) -> Vec<Option<f64>> {
    tmax.iter()
        .zip(tmin)
        .map(|(hi, lo)| match (hi, lo) {
            (Some(hi), Some(lo)) => Some((hi + lo) / 2.0),
            _ => None,
        })
        .collect()
}

/// `(CDD, HDD)` for one day's average temperature.
pub fn degree_days(tavg: f64, base: f64) -> (f64, f64) {
    ((tavg - base).max(0.0), (base - tavg).max(0.0))
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

pub struct DegreeDayPanelBuilder {
    config: DegreeDayConfig,
    frames: Vec<DataFrame>,
}

impl DegreeDayPanelBuilder {
    pub fn new(config: DegreeDayConfig) -> Self {
        Self { config, frames: Vec::new() }
    }

    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let df = read_csv(path)?;
        self.add_frame(&path.display().to_string(), &df)
    }

    /// Stage `(date, datatype, value)` rows from one long weather table.
    pub fn add_frame(&mut self, origin: &str, df: &DataFrame) -> Result<()> {
        let map = weather_schema()
            .resolve(&column_names(df))
            .map_err(|m| PipelineError::schema(origin, m))?;
        let date_col = map.get(Role::Date).unwrap_or("date");
        let type_col = map.get(Role::Category).unwrap_or(DATATYPE);
        let value_col = map.get(Role::Value).unwrap_or(VALUE);

        let raw_dates = string_values(df, date_col)?;
        let raw_types = string_values(df, type_col)?;
        let raw_values = float_values(df, value_col)?;

        let mut dates = Vec::new();
        let mut types = Vec::new();
        let mut values = Vec::new();
        let mut dropped = DroppedRows::default();
        for ((raw_date, raw_type), value) in raw_dates.into_iter().zip(raw_types).zip(raw_values) {
            let parsed = require_date(origin, date_col, raw_date.as_deref().unwrap_or(""));
            let Some(date) = dropped.absorb(parsed)? else { continue };
            let (Some(datatype), Some(value)) = (raw_type, value) else {
                dropped.count += 1;
                continue;
            };
            dates.push(format_date(date));
            types.push(datatype.trim().to_uppercase());
            values.push(value);
        }
        dropped.report(origin);

        self.frames.push(df!(DATE => dates, DATATYPE => types, VALUE => values)?);
        Ok(())
    }

    pub fn finish(self) -> Result<DailyPanel> {
        if self.frames.is_empty() {
            return Err(PipelineError::NoUsableData("no weather files were added".to_string()));
        }

        let lazy: Vec<LazyFrame> = self.frames.into_iter().map(|df| df.lazy()).collect();
        let long = concat(lazy.as_slice(), UnionArgs::default())?
            .group_by([col(DATE), col(DATATYPE)])
            .agg([col(VALUE).mean()])
            .collect()?;

        let mut wide = pivot_wide(&long)?;
        if wide.dates.is_empty() {
            return Err(PipelineError::NoUsableData("weather files contained no dated rows".to_string()));
        }
        let (cdd, hdd) = wide.degree_days(&self.config)?;

        let panel = DailyPanel::new(PanelKind::DegreeDays, df!(DATE => wide.dates, CDD => cdd, HDD => hdd)?)?;
        log::info!("degree-day panel: {} days", panel.height());
        Ok(panel)
    }
}

/// Long-to-wide: one column per datatype, aligned on sorted dates.
struct WideWeather {
    dates: Vec<String>,
    columns: HashMap<String, Vec<Option<f64>>>,
}

fn pivot_wide(long: &DataFrame) -> Result<WideWeather> {
    let mut cells: BTreeMap<String, HashMap<String, f64>> = BTreeMap::new();
    let dates = string_values(long, DATE)?;
    let types = string_values(long, DATATYPE)?;
    let values = float_values(long, VALUE)?;
    for ((date, datatype), value) in dates.into_iter().zip(types).zip(values) {
        if let (Some(date), Some(datatype), Some(value)) = (date, datatype, value) {
            cells.entry(date).or_default().insert(datatype, value);
        }
    }

    let mut names: Vec<String> = cells.values().flat_map(|row| row.keys().cloned()).collect();
    names.sort();
    names.dedup();

    let columns = names
        .into_iter()
        .map(|name| {
            let column = cells.values().map(|row| row.get(&name).copied()).collect();
            (name, column)
        })
        .collect();

    Ok(WideWeather { dates: cells.into_keys().collect(), columns })
}

impl WideWeather {
    fn has(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn degree_days(&mut self, config: &DegreeDayConfig) -> Result<(Vec<Option<f64>>, Vec<Option<f64>>)> {
        for name in [TMAX, TMIN, TAVG] {
            if let Some(column) = self.columns.get_mut(name) {
                let fixed = correct_tenths_scale(column, config.tenths_threshold);
                if fixed.corrected {
                    log::info!("{} looks like tenths of a degree, dividing by 10", name);
                }
                *column = fixed.values;
            }
        }

        if self.has(SOURCE_CDD) && self.has(SOURCE_HDD) {
            log::info!("using CDD/HDD as published in the weather source");
            let cdd = self.columns.remove(SOURCE_CDD).unwrap_or_default();
            let hdd = self.columns.remove(SOURCE_HDD).unwrap_or_default();
            return Ok((cdd, hdd));
        }

        let tavg = match (self.columns.get(TAVG), self.columns.get(TMAX), self.columns.get(TMIN)) {
            (Some(tavg), _, _) => tavg.clone(),
            (None, Some(tmax), Some(tmin)) => {
                log::info!("TAVG absent, deriving it as the TMAX/TMIN midpoint");
                midpoint_temperature(tmax, tmin)
            }
            _ => {
                let mut available: Vec<String> = self.columns.keys().cloned().collect();
                available.sort();
                return Err(PipelineError::SchemaMismatch {
                    origin: "weather datatypes".to_string(),
                    missing: vec!["CDD/HDD or TAVG or TMAX+TMIN".to_string()],
                    available,
                });
            }
        };

        let (cdd, hdd) = tavg
            .iter()
            .map(|t| match t {
                Some(t) => {
                    let (c, h) = degree_days(*t, config.base_temperature);
                    (Some(c), Some(h))
                }
                None => (None, None),
            })
            .unzip();
        Ok((cdd, hdd))
    }
}
