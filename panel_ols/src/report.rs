//! Coefficient table and Markdown summary for a persisted model.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::FittedModel;

const DECIMALS: i32 = 6;

/// One row of `ols_coefficients.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub term: String,
    pub coef: f64,
    pub std_err: f64,
    pub t_or_z: f64,
    pub p_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

fn round(value: f64) -> f64 {
    let scale = 10f64.powi(DECIMALS);
    (value * scale).round() / scale
}

pub fn coefficient_rows(model: &FittedModel) -> Vec<CoefficientRow> {
    model
        .terms
        .iter()
        .map(|t| CoefficientRow {
            term: t.term.clone(),
            coef: round(t.coef),
            std_err: round(t.std_err),
            t_or_z: round(t.t_stat),
            p_value: round(t.p_value),
            ci_low: round(t.ci_low),
            ci_high: round(t.ci_high),
        })
        .collect()
}

pub fn write_coefficients(model: &FittedModel, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in coefficient_rows(model) {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("wrote {} coefficients to {}", model.terms.len(), path.display());
    Ok(())
}

fn or_na(value: f64) -> String {
    if value.is_finite() {
        format!("{:.6}", value)
    } else {
        "NA".to_string()
    }
}

/// Artifact names printed under the report title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSources {
    pub model: Option<String>,
    pub data: Option<String>,
}

impl ReportSources {
    pub fn new(model: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            data: Some(data.into()),
        }
    }
}

/// `0.95` as `95`, `0.975` as `97.5`.
fn percent(level: f64) -> String {
    let pct = (level * 100.0 * 1e6).round() / 1e6;
    format!("{}", pct)
}

/// Write the Markdown report: key statistics, then the coefficient table.
pub fn write_report<W: Write>(model: &FittedModel, sources: &ReportSources, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "# OLS Regression Report")?;
    writeln!(out)?;
    if let Some(name) = &sources.model {
        writeln!(out, "- Model file: `{}`", name)?;
    }
    if let Some(name) = &sources.data {
        writeln!(out, "- Data file: `{}`", name)?;
    }
    if sources.model.is_some() || sources.data.is_some() {
        writeln!(out)?;
    }
    writeln!(out, "## Model Summary (key stats)")?;
    writeln!(out)?;
    writeln!(out, "| metric | value |")?;
    writeln!(out, "|---|---:|")?;
    writeln!(out, "| Dependent var | `{}` |", model.dependent)?;
    writeln!(out, "| N (obs) | {} |", model.nobs)?;
    writeln!(out, "| Df model | {} |", model.df_model)?;
    writeln!(out, "| Df residuals | {} |", model.df_resid)?;
    writeln!(out, "| R² | {} |", or_na(model.r_squared))?;
    writeln!(out, "| Adj. R² | {} |", or_na(model.adj_r_squared))?;
    writeln!(out, "| F-stat | {} |", or_na(model.f_statistic))?;
    writeln!(out, "| Prob(F) | {} |", or_na(model.f_p_value))?;
    writeln!(out, "| Log-likelihood | {} |", or_na(model.log_likelihood))?;
    writeln!(out, "| AIC | {} |", or_na(model.aic))?;
    writeln!(out, "| BIC | {} |", or_na(model.bic))?;
    writeln!(out)?;

    writeln!(out, "## Coefficients")?;
    writeln!(out)?;
    writeln!(out, "| term | coef | std_err | t_or_z | p_value | ci_low | ci_high |")?;
    writeln!(out, "|---|---:|---:|---:|---:|---:|---:|")?;
    for row in coefficient_rows(model) {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} |",
            row.term,
            or_na(row.coef),
            or_na(row.std_err),
            or_na(row.t_or_z),
            or_na(row.p_value),
            or_na(row.ci_low),
            or_na(row.ci_high)
        )?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "> Values rounded to 6 decimals. Confidence intervals are {}%.",
        percent(model.confidence_level)
    )?;
    Ok(())
}

pub fn render_markdown(model: &FittedModel, sources: &ReportSources) -> std::io::Result<String> {
    let mut buf = Vec::new();
    write_report(model, sources, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn write_markdown(model: &FittedModel, sources: &ReportSources, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(File::create(path)?);
    write_report(model, sources, &mut file)?;
    file.flush()?;
    log::info!("wrote regression report to {}", path.display());
    Ok(())
}
