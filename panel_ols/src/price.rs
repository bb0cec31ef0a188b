//! Daily hub price from the hourly settlement-point workbook.

use polars::prelude::*;

use crate::coerce::{format_date, parse_hour, require_date, require_number, DroppedRows};
use crate::error::{PipelineError, Result};
use crate::models::{DailyPanel, PanelKind, DATE, PRICE};
use crate::schema::{ColumnSchema, MatchPolicy, Role};
use crate::workbook::{Cell, Sheet, Workbook};

pub const DEFAULT_HUB: &str = "HB_BUSAVG";

pub fn price_schema() -> ColumnSchema {
    ColumnSchema::new(MatchPolicy::Exact)
        .required(
            Role::SettlementPoint,
            &["settlement point name", "settlement point", "settlementpointname", "settlementpoint"],
        )
        .required(
            Role::Date,
            &["delivery date", "deliverydate", "date", "operday", "operating day"],
        )
        .required(Role::Hour, &["delivery hour", "deliveryhour", "hourending", "hour ending", "hour"])
        .required(
            Role::Price,
            &["settlement point price", "settlementpointprice", "spp", "lmp", "price"],
        )
}

pub struct PricePanelBuilder {
    hub: String,
}

impl PricePanelBuilder {
    pub fn new(hub: impl Into<String>) -> Self {
        Self { hub: hub.into() }
    }

    pub fn hub(&self) -> &str {
        &self.hub
    }

    /// Concatenate every sheet, keep the hub, average to (date, hour) and then
    /// to date.
    pub fn build(&self, workbook: &Workbook) -> Result<DailyPanel> {
        let mut dates: Vec<String> = Vec::new();
        let mut hours: Vec<i64> = Vec::new();
        let mut prices: Vec<f64> = Vec::new();

        for sheet in &workbook.sheets {
            let before = dates.len();
            self.collect_sheet(sheet, &mut dates, &mut hours, &mut prices)?;
            log::debug!("sheet {}: {} hub rows", sheet.name, dates.len() - before);
        }

        if dates.is_empty() {
            return Err(PipelineError::NoUsableData(format!(
                "no {} rows in sheets {:?}",
                self.hub,
                workbook.sheet_names()
            )));
        }

        let hourly = df!(
            DATE => dates,
            "hour" => hours,
            PRICE => prices,
        )?;

        let daily = hourly
            .lazy()
            .group_by([col(DATE), col("hour")])
            .agg([col(PRICE).mean()])
            .group_by([col(DATE)])
            .agg([col(PRICE).mean()])
            .collect()?;

        let panel = DailyPanel::new(PanelKind::Price, daily)?;
        log::info!("price panel for {}: {} days", self.hub, panel.height());
        Ok(panel)
    }

    fn collect_sheet(
        &self,
        sheet: &Sheet,
        dates: &mut Vec<String>,
        hours: &mut Vec<i64>,
        prices: &mut Vec<f64>,
    ) -> Result<()> {
        let Some(header_idx) = sheet.rows.iter().position(|row| row.iter().any(|c| !c.is_empty())) else {
            log::warn!("sheet {} is empty, skipping", sheet.name);
            return Ok(());
        };

        let header: Vec<String> = sheet.rows[header_idx].iter().map(Cell::label).collect();
        let origin = format!("price sheet {}", sheet.name);
        let map = price_schema()
            .resolve(&header)
            .map_err(|m| PipelineError::schema(origin.clone(), m))?;

        let index_of = |role: Role| -> usize {
            map.get(role)
                .and_then(|label| header.iter().position(|h| h == label))
                .unwrap_or(usize::MAX)
        };
        let (point_idx, date_idx, hour_idx, price_idx) = (
            index_of(Role::SettlementPoint),
            index_of(Role::Date),
            index_of(Role::Hour),
            index_of(Role::Price),
        );

        let mut dropped = DroppedRows::default();
        for row in &sheet.rows[header_idx + 1..] {
            let cell = |idx: usize| row.get(idx).unwrap_or(&Cell::Empty);

            if !cell(point_idx).label().eq_ignore_ascii_case(&self.hub) {
                continue;
            }

            let date = match cell(date_idx) {
                Cell::DateTime(dt) => Ok(dt.date()),
                other => require_date(&origin, "date", &other.label()),
            };
            let Some(date) = dropped.absorb(date)? else { continue };

            let hour = parse_hour(&cell(hour_idx).label()).ok_or_else(|| PipelineError::ValueCoercion {
                origin: origin.clone(),
                column: "hour".to_string(),
                value: cell(hour_idx).label(),
            });
            let Some(hour) = dropped.absorb(hour)? else { continue };

            let price = match cell(price_idx).as_f64() {
                Some(v) => Ok(v),
                None => require_number(&origin, "price", &cell(price_idx).label()),
            };
            let Some(price) = dropped.absorb(price)? else { continue };

            dates.push(format_date(date));
            hours.push(hour);
            prices.push(price);
        }
        dropped.report(&origin);
        Ok(())
    }
}

impl Default for PricePanelBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_HUB)
    }
}
