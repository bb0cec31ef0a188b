use std::collections::HashSet;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::io::{float_values, string_values};

pub const DATE: &str = "date";
pub const PRICE: &str = "Price_t";
pub const LOAD: &str = "Load_t";
pub const CDD: &str = "CDD_t";
pub const HDD: &str = "HDD_t";
pub const RENEWABLE_SHARE: &str = "RenewableShare_t";
pub const LN_PRICE: &str = "ln_Price_t";
pub const LN_LOAD: &str = "ln_Load_t";

/// The four daily metric families the pipeline assembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelKind {
    Price,
    Load,
    DegreeDays,
    RenewableShare,
}

impl PanelKind {
    pub const ALL: [PanelKind; 4] = [
        PanelKind::Price,
        PanelKind::Load,
        PanelKind::DegreeDays,
        PanelKind::RenewableShare,
    ];

    pub fn value_columns(&self) -> &'static [&'static str] {
        match self {
            PanelKind::Price => &[PRICE],
            PanelKind::Load => &[LOAD],
            PanelKind::DegreeDays => &[CDD, HDD],
            PanelKind::RenewableShare => &[RENEWABLE_SHARE],
        }
    }

    /// Default artifact name, matching what the report tooling expects.
    pub fn file_name(&self) -> &'static str {
        match self {
            PanelKind::Price => "Price_Clean.csv",
            PanelKind::Load => "Load_Clean.csv",
            PanelKind::DegreeDays => "CDD_HDD_Clean.csv",
            PanelKind::RenewableShare => "RenewableShare_Clean.csv",
        }
    }
}

/// Date-ordered daily series for one metric family, one row per date.
#[derive(Debug, Clone)]
pub struct DailyPanel {
    kind: PanelKind,
    frame: DataFrame,
}

impl DailyPanel {
    /// Validate and canonicalize `frame`: keep `date` plus the kind's value
    /// columns, cast values to f64, sort by date, reject duplicate or null
    /// dates.
    pub fn new(kind: PanelKind, frame: DataFrame) -> Result<Self> {
        let present: HashSet<String> = frame
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut selection = vec![col(DATE).cast(DataType::String)];
        for name in kind.value_columns() {
            if !present.contains(*name) {
                return Err(PipelineError::InvalidPanel(format!(
                    "{:?} panel is missing column {}",
                    kind, name
                )));
            }
            selection.push(col(*name).cast(DataType::Float64));
        }
        if !present.contains(DATE) {
            return Err(PipelineError::InvalidPanel(format!("{:?} panel has no date column", kind)));
        }

        let frame = frame
            .lazy()
            .select(selection)
            .sort([DATE], Default::default())
            .collect()?;

        let mut seen = HashSet::new();
        for date in string_values(&frame, DATE)? {
            let date = date.ok_or_else(|| {
                PipelineError::InvalidPanel(format!("{:?} panel has a null date", kind))
            })?;
            if !seen.insert(date.clone()) {
                return Err(PipelineError::InvalidPanel(format!(
                    "{:?} panel has duplicate date {}",
                    kind, date
                )));
            }
        }

        Ok(Self { kind, frame })
    }

    pub fn kind(&self) -> PanelKind {
        self.kind
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn dates(&self) -> Result<Vec<String>> {
        Ok(string_values(&self.frame, DATE)?.into_iter().flatten().collect())
    }

    pub fn values(&self, column: &str) -> Result<Vec<Option<f64>>> {
        float_values(&self.frame, column)
    }

    /// Value of `column` on `date`, `None` if the date is absent or null.
    pub fn value_on(&self, date: &str, column: &str) -> Result<Option<f64>> {
        let dates = string_values(&self.frame, DATE)?;
        let values = self.values(column)?;
        Ok(dates
            .iter()
            .position(|d| d.as_deref() == Some(date))
            .and_then(|idx| values[idx]))
    }
}

/// JSON has no NaN or infinity; those round-trip through `null`.
mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
        if value.is_finite() {
            s.serialize_f64(*value)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEstimate {
    pub term: String,
    #[serde(with = "non_finite")]
    pub coef: f64,
    #[serde(with = "non_finite")]
    pub std_err: f64,
    #[serde(with = "non_finite")]
    pub t_stat: f64,
    #[serde(with = "non_finite")]
    pub p_value: f64,
    #[serde(with = "non_finite")]
    pub ci_low: f64,
    #[serde(with = "non_finite")]
    pub ci_high: f64,
}

fn default_confidence_level() -> f64 {
    0.95
}

/// Fitted OLS model, created once and read by the report and plots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub dependent: String,
    pub terms: Vec<TermEstimate>,
    pub nobs: usize,
    pub df_model: usize,
    pub df_resid: usize,
    #[serde(with = "non_finite")]
    pub r_squared: f64,
    #[serde(with = "non_finite")]
    pub adj_r_squared: f64,
    #[serde(with = "non_finite")]
    pub f_statistic: f64,
    #[serde(with = "non_finite")]
    pub f_p_value: f64,
    #[serde(with = "non_finite")]
    pub log_likelihood: f64,
    #[serde(with = "non_finite")]
    pub aic: f64,
    #[serde(with = "non_finite")]
    pub bic: f64,
    /// Two-sided coverage of `ci_low..ci_high`.
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    // Per observation, in dataset order
    pub dates: Vec<String>,
    pub actual: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
}

impl FittedModel {
    pub fn term(&self, name: &str) -> Option<&TermEstimate> {
        self.terms.iter().find(|t| t.term == name)
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.term(name).map(|t| t.coef)
    }

    pub fn regressors(&self) -> Vec<&str> {
        self.terms
            .iter()
            .map(|t| t.term.as_str())
            .filter(|t| *t != crate::regression::CONST_TERM)
            .collect()
    }
}
