//! Daily wind+solar share of generation from the monthly fuel-mix workbook.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::coerce::{format_date, require_date, require_number, DroppedRows};
use crate::error::{PipelineError, Result};
use crate::models::{DailyPanel, PanelKind, DATE, RENEWABLE_SHARE};
use crate::schema::{normalize_label, ColumnSchema, MatchPolicy, Role};
use crate::workbook::{Cell, Sheet, Workbook};

pub const MONTH_SHEETS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const TOTAL_GEN: &str = "total_gen";
const RENEWABLE_GEN: &str = "renewable_gen";

fn fuel_schema() -> ColumnSchema {
    ColumnSchema::new(MatchPolicy::Exact)
        .required(Role::Date, &["date"])
        .required(Role::Fuel, &["fuel"])
        .required(Role::Total, &["total"])
}

/// One `(date, fuel, total)` observation from a monthly sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelRow {
    pub date: String,
    pub fuel: String,
    pub total: f64,
}

pub fn is_month_sheet(name: &str) -> bool {
    MONTH_SHEETS.iter().any(|m| m.eq_ignore_ascii_case(name.trim()))
}

/// Index of the header row: the first row labelled `date`, `fuel` and
/// `total`, else the first labelled `date` and `fuel`.
pub fn locate_header_row(rows: &[Vec<Cell>]) -> Option<usize> {
    let labels: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| normalize_label(&c.label())).collect())
        .collect();
    let has = |row: &[String], wanted: &str| row.iter().any(|l| l == wanted);

    labels
        .iter()
        .position(|row| has(row, "date") && has(row, "fuel") && has(row, "total"))
        .or_else(|| labels.iter().position(|row| has(row, "date") && has(row, "fuel")))
}

/// Parse one monthly sheet into fuel rows; sheets without a usable header
/// yield nothing.
pub fn parse_month_sheet(sheet: &Sheet) -> Result<Vec<FuelRow>> {
    let sheet = sheet.compact();
    let Some(header_idx) = locate_header_row(&sheet.rows) else {
        log::warn!("sheet {}: no header row with date and fuel, skipping", sheet.name);
        return Ok(Vec::new());
    };

    let header: Vec<String> = sheet.rows[header_idx].iter().map(Cell::label).collect();
    let map = match fuel_schema().resolve(&header) {
        Ok(map) => map,
        Err(mismatch) => {
            log::warn!("sheet {}: header lacks {:?}, skipping", sheet.name, mismatch.missing);
            return Ok(Vec::new());
        }
    };
    let index_of = |role: Role| {
        map.get(role)
            .and_then(|label| header.iter().position(|h| h == label))
            .unwrap_or(usize::MAX)
    };
    let (date_idx, fuel_idx, total_idx) = (index_of(Role::Date), index_of(Role::Fuel), index_of(Role::Total));

    let origin = format!("fuel-mix sheet {}", sheet.name);
    let mut rows = Vec::new();
    let mut dropped = DroppedRows::default();
    for row in &sheet.rows[header_idx + 1..] {
        let cell = |idx: usize| row.get(idx).unwrap_or(&Cell::Empty);

        let date = match cell(date_idx).as_date() {
            Some(date) => Ok(date),
            None => require_date(&origin, "date", &cell(date_idx).label()),
        };
        let Some(date) = dropped.absorb(date)? else { continue };

        let total = match cell(total_idx).as_f64() {
            Some(v) => Ok(v),
            None => require_number(&origin, "total", &cell(total_idx).label()),
        };
        let Some(total) = dropped.absorb(total)? else { continue };

        rows.push(FuelRow {
            date: format_date(date),
            fuel: cell(fuel_idx).label().to_lowercase(),
            total,
        });
    }
    dropped.report(&origin);
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewableSharePanelBuilder {
    /// Fuel-name substrings counted as renewable.
    pub keywords: Vec<String>,
}

impl Default for RenewableSharePanelBuilder {
    fn default() -> Self {
        Self { keywords: vec!["wind".to_string(), "solar".to_string()] }
    }
}

impl RenewableSharePanelBuilder {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect() }
    }

    pub fn is_renewable(&self, fuel: &str) -> bool {
        let fuel = fuel.to_lowercase();
        self.keywords.iter().any(|k| fuel.contains(k.as_str()))
    }

    pub fn build(&self, workbook: &Workbook) -> Result<DailyPanel> {
        let mut rows = Vec::new();
        for sheet in &workbook.sheets {
            if !is_month_sheet(&sheet.name) {
                log::debug!("ignoring non-month sheet {}", sheet.name);
                continue;
            }
            let parsed = parse_month_sheet(sheet)?;
            log::debug!("sheet {}: {} fuel rows", sheet.name, parsed.len());
            rows.extend(parsed);
        }

        if rows.is_empty() {
            return Err(PipelineError::NoUsableData(
                "no usable monthly sheets (Jan..Dec) in fuel-mix workbook".to_string(),
            ));
        }

        let renewable: Vec<f64> = rows
            .iter()
            .map(|r| if self.is_renewable(&r.fuel) { r.total } else { 0.0 })
            .collect();
        let long = df!(
            DATE => rows.iter().map(|r| r.date.as_str()).collect::<Vec<_>>(),
            TOTAL_GEN => rows.iter().map(|r| r.total).collect::<Vec<_>>(),
            RENEWABLE_GEN => renewable,
        )?;

        let daily = long
            .lazy()
            .group_by([col(DATE)])
            .agg([col(TOTAL_GEN).sum(), col(RENEWABLE_GEN).sum()])
            .with_column(
                when(col(TOTAL_GEN).gt(lit(0.0)))
                    .then(col(RENEWABLE_GEN) / col(TOTAL_GEN))
                    .otherwise(lit(NULL).cast(DataType::Float64))
                    .alias(RENEWABLE_SHARE),
            )
            .collect()?;

        let panel = DailyPanel::new(PanelKind::RenewableShare, daily)?;
        log::info!("renewable-share panel: {} days", panel.height());
        Ok(panel)
    }
}
