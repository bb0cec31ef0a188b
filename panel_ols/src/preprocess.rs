//! Merged panel → regression dataset.
//!
//! Filtering runs in a fixed order: negative or missing price, then rows with
//! any missing modeled value, then the log transform, then rows the transform
//! left non-finite.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::io::{column_names, float_values, string_values};
use crate::models::{CDD, DATE, HDD, LN_LOAD, LN_PRICE, LOAD, PRICE, RENEWABLE_SHARE};
use crate::schema::{ColumnSchema, MatchPolicy, Role};

pub const DEFAULT_LOG_OFFSET: f64 = 0.001;

/// Regressors in model order.
pub const REGRESSORS: [&str; 4] = [LN_LOAD, CDD, HDD, RENEWABLE_SHARE];

pub fn model_schema() -> ColumnSchema {
    ColumnSchema::new(MatchPolicy::ExactThenPattern)
        .required(Role::Date, &["date"])
        .required(Role::Price, &["price"])
        .required(Role::Load, &["load"])
        .required(Role::Cdd, &["cdd", "coolingdegree", "cooling_deg"])
        .required(Role::Hdd, &["hdd", "heatingdegree", "heating_deg"])
        .required(
            Role::RenewableShare,
            &["renewableshare", "renew_share", "renew", "rs", "solar_wind_share"],
        )
}

/// Row counts at each filtering step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessSummary {
    pub input_rows: usize,
    pub dropped_negative_price: usize,
    pub dropped_incomplete: usize,
    pub dropped_non_finite: usize,
    pub output_rows: usize,
}

/// Filtered, log-transformed observations ready for fitting.
///
/// Every row has finite values for the target and all regressors.
#[derive(Debug, Clone)]
pub struct RegressionDataset {
    frame: DataFrame,
}

impl RegressionDataset {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn dependent(&self) -> &'static str {
        LN_PRICE
    }

    pub fn regressors(&self) -> &'static [&'static str] {
        &REGRESSORS
    }

    pub fn dates(&self) -> Result<Vec<String>> {
        Ok(string_values(&self.frame, DATE)?.into_iter().flatten().collect())
    }

    pub fn target(&self) -> Result<Vec<f64>> {
        dense(&self.frame, LN_PRICE)
    }

    /// One vector per regressor, in [`REGRESSORS`] order.
    pub fn regressor_columns(&self) -> Result<Vec<Vec<f64>>> {
        REGRESSORS.iter().map(|name| dense(&self.frame, name)).collect()
    }
}

fn dense(frame: &DataFrame, column: &str) -> Result<Vec<f64>> {
    float_values(frame, column)?
        .into_iter()
        .map(|v| {
            v.filter(|x| x.is_finite()).ok_or_else(|| {
                PipelineError::InvalidPanel(format!("regression column {} has a missing or non-finite value", column))
            })
        })
        .collect()
}

/// Re-validate a dataset read back from `preprocessed_data.csv`.
impl TryFrom<DataFrame> for RegressionDataset {
    type Error = PipelineError;

    fn try_from(frame: DataFrame) -> Result<Self> {
        let present = column_names(&frame);
        let required = std::iter::once(DATE).chain(std::iter::once(LN_PRICE)).chain(REGRESSORS);
        let missing: Vec<String> = required
            .filter(|c| !present.iter().any(|p| p == c))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                origin: "regression dataset".to_string(),
                missing,
                available: present,
            });
        }
        let dataset = Self { frame };
        dataset.target()?;
        dataset.regressor_columns()?;
        Ok(dataset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Added before taking logs so zero prices and loads stay defined.
    pub log_offset: f64,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self { log_offset: DEFAULT_LOG_OFFSET }
    }
}

impl Preprocessor {
    pub fn new(log_offset: f64) -> Self {
        Self { log_offset }
    }

    pub fn run(&self, merged: &DataFrame) -> Result<(RegressionDataset, PreprocessSummary)> {
        let map = model_schema()
            .resolve(&column_names(merged))
            .map_err(|m| PipelineError::schema("merged panel", m))?;
        let pick = |role: Role| map.get(role).unwrap_or_default().to_string();

        let dates = string_values(merged, &pick(Role::Date))?;
        let price = float_values(merged, &pick(Role::Price))?;
        let load = float_values(merged, &pick(Role::Load))?;
        let cdd = float_values(merged, &pick(Role::Cdd))?;
        let hdd = float_values(merged, &pick(Role::Hdd))?;
        let share = float_values(merged, &pick(Role::RenewableShare))?;

        let mut summary = PreprocessSummary { input_rows: merged.height(), ..Default::default() };
        let mut rows: Vec<[f64; 7]> = Vec::new();
        let mut kept_dates: Vec<String> = Vec::new();

        for i in 0..merged.height() {
            let Some(p) = price[i].filter(|p| *p >= 0.0) else {
                summary.dropped_negative_price += 1;
                continue;
            };
            let (Some(date), Some(l), Some(c), Some(h), Some(s)) =
                (dates[i].clone(), load[i], cdd[i], hdd[i], share[i])
            else {
                summary.dropped_incomplete += 1;
                continue;
            };

            let row = [p, l, c, h, s, (p + self.log_offset).ln(), (l + self.log_offset).ln()];
            if row.iter().any(|v| !v.is_finite()) {
                summary.dropped_non_finite += 1;
                continue;
            }
            kept_dates.push(date);
            rows.push(row);
        }
        summary.output_rows = rows.len();

        log::info!(
            "preprocess: {} rows in, dropped {} negative/missing price, {} incomplete, {} non-finite; {} rows out",
            summary.input_rows,
            summary.dropped_negative_price,
            summary.dropped_incomplete,
            summary.dropped_non_finite,
            summary.output_rows
        );

        if rows.is_empty() {
            return Err(PipelineError::NoUsableData(
                "no rows survived preprocessing".to_string(),
            ));
        }

        let column = |k: usize| rows.iter().map(|r| r[k]).collect::<Vec<f64>>();
        let frame = df!(
            DATE => kept_dates,
            PRICE => column(0),
            LOAD => column(1),
            CDD => column(2),
            HDD => column(3),
            RENEWABLE_SHARE => column(4),
            LN_PRICE => column(5),
            LN_LOAD => column(6),
        )?;
        Ok((RegressionDataset { frame }, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn merged() -> DataFrame {
        df!(
            "date" => ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05"],
            "Price_t" => [Some(-5.0), Some(0.0), None, Some(30.0), Some(40.0)],
            "Load_t" => [Some(100.0), Some(200.0), Some(300.0), None, Some(-10.0)],
            "CDD_t" => [Some(0.0); 5],
            "HDD_t" => [Some(1.0); 5],
            "RenewableShare_t" => [Some(0.2); 5],
        )
        .unwrap()
    }

    #[test]
    fn filters_apply_in_order_and_are_counted() {
        let (dataset, summary) = Preprocessor::default().run(&merged()).unwrap();
        assert_eq!(
            summary,
            PreprocessSummary {
                input_rows: 5,
                dropped_negative_price: 2,
                dropped_incomplete: 1,
                dropped_non_finite: 1,
                output_rows: 1,
            }
        );
        assert_eq!(dataset.dates().unwrap(), vec!["2024-01-02"]);
    }

    #[test]
    fn zero_price_stays_defined_through_offset() {
        let (dataset, _) = Preprocessor::default().run(&merged()).unwrap();
        assert_relative_eq!(dataset.target().unwrap()[0], 0.001f64.ln());
        assert_relative_eq!(dataset.regressor_columns().unwrap()[0][0], 200.001f64.ln());
    }

    #[test]
    fn suffixed_headers_are_detected() {
        let df = df!(
            "Date" => ["2024-01-01"],
            "PRICE2024" => [50.0],
            "load_mw" => [1000.0],
            "cdd" => [2.0],
            "HeatingDegree" => [0.0],
            "renew_share" => [0.3],
        )
        .unwrap();
        let (dataset, _) = Preprocessor::new(0.0).run(&df).unwrap();
        assert_relative_eq!(dataset.target().unwrap()[0], 50f64.ln());
        assert_eq!(dataset.regressor_columns().unwrap()[3], vec![0.3]);
    }

    #[test]
    fn missing_renewable_column_is_schema_mismatch() {
        let df = df!("date" => ["2024-01-01"], "Price_t" => [1.0], "Load_t" => [1.0], "CDD_t" => [0.0], "HDD_t" => [0.0]).unwrap();
        let err = Preprocessor::default().run(&df).unwrap_err();
        match err {
            PipelineError::SchemaMismatch { missing, .. } => assert_eq!(missing, vec!["renewable_share".to_string()]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn all_rows_filtered_is_no_usable_data() {
        let df = df!(
            "date" => ["2024-01-01"],
            "Price_t" => [-1.0],
            "Load_t" => [1.0],
            "CDD_t" => [0.0],
            "HDD_t" => [0.0],
            "RenewableShare_t" => [0.1],
        )
        .unwrap();
        assert!(matches!(
            Preprocessor::default().run(&df).unwrap_err(),
            PipelineError::NoUsableData(_)
        ));
    }

    #[test]
    fn output_round_trips_through_dataset_validation() {
        let (dataset, _) = Preprocessor::default().run(&merged()).unwrap();
        let again = RegressionDataset::try_from(dataset.frame().clone()).unwrap();
        assert_eq!(again.len(), 1);
        assert!(RegressionDataset::try_from(df!("date" => ["x"]).unwrap()).is_err());
    }
}
