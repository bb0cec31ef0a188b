//! Ordinary least squares with an intercept.
//!
//! Coefficients come from the normal equations `XᵀX β = Xᵀy`, solved through
//! a Cholesky factorization; the same factorization gives `(XᵀX)⁻¹` for the
//! coefficient covariance. Inference uses Student's t and Fisher's F.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::error::{PipelineError, Result};
use crate::models::{FittedModel, TermEstimate};
use crate::preprocess::RegressionDataset;

pub const CONST_TERM: &str = "const";

/// Smallest Cholesky pivot, relative to the largest, treated as full rank.
const RANK_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OlsFitter {
    /// Two-sided coverage of the coefficient intervals.
    pub confidence_level: f64,
}

impl Default for OlsFitter {
    fn default() -> Self {
        Self { confidence_level: 0.95 }
    }
}

impl OlsFitter {
    /// Fit `ln_Price_t` on the dataset's regressors plus an intercept.
    pub fn fit(&self, dataset: &RegressionDataset) -> Result<FittedModel> {
        let model = self.fit_columns(
            dataset.dependent(),
            &dataset.target()?,
            dataset.regressors(),
            &dataset.regressor_columns()?,
            dataset.dates()?,
        )?;
        log::info!(
            "OLS {} ~ {}: n={}, R²={:.4}, adj R²={:.4}, F={:.3}",
            model.dependent,
            model.regressors().join(" + "),
            model.nobs,
            model.r_squared,
            model.adj_r_squared,
            model.f_statistic
        );
        Ok(model)
    }

    /// Fit `y` on `columns` (one vector per named regressor) plus `const`.
    pub fn fit_columns(
        &self,
        dependent: &str,
        y: &[f64],
        names: &[&str],
        columns: &[Vec<f64>],
        dates: Vec<String>,
    ) -> Result<FittedModel> {
        let n = y.len();
        let k = names.len() + 1;
        if columns.len() != names.len() || columns.iter().any(|c| c.len() != n) {
            return Err(PipelineError::InvalidPanel(
                "regressor columns do not line up with the target".to_string(),
            ));
        }
        if n <= k {
            return Err(PipelineError::NoUsableData(format!(
                "{} observations cannot identify {} terms",
                n, k
            )));
        }

        let x = DMatrix::from_fn(n, k, |i, j| if j == 0 { 1.0 } else { columns[j - 1][i] });
        let y_vec = DVector::from_column_slice(y);

        let xtx = x.transpose() * &x;
        let xty = x.transpose() * &y_vec;
        let cholesky = match xtx.cholesky() {
            Some(cholesky) => cholesky,
            None => return Err(singular(names, columns, None)),
        };
        let pivots = cholesky.l_dirty().diagonal();
        if pivots.min() <= pivots.max() * RANK_TOLERANCE {
            return Err(singular(names, columns, Some(&pivots)));
        }
        let beta = cholesky.solve(&xty);
        let xtx_inv = cholesky.inverse();

        let fitted = &x * &beta;
        let residuals = &y_vec - &fitted;

        let df_model = k - 1;
        let df_resid = n - k;
        let nf = n as f64;

        let ssr = residuals.norm_squared();
        let mean = y_vec.mean();
        let tss: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
        let r_squared = 1.0 - ssr / tss;
        let adj_r_squared = 1.0 - (nf - 1.0) / df_resid as f64 * (1.0 - r_squared);

        let sigma2 = ssr / df_resid as f64;
        let t_dist = StudentsT::new(0.0, 1.0, df_resid as f64)
            .map_err(|e| PipelineError::Statistics(e.to_string()))?;
        let t_crit = t_dist.inverse_cdf(1.0 - (1.0 - self.confidence_level) / 2.0);

        let term_names = std::iter::once(CONST_TERM).chain(names.iter().copied());
        let terms = term_names
            .enumerate()
            .map(|(j, name)| {
                let coef = beta[j];
                let std_err = (sigma2 * xtx_inv[(j, j)]).sqrt();
                let t_stat = coef / std_err;
                TermEstimate {
                    term: name.to_string(),
                    coef,
                    std_err,
                    t_stat,
                    p_value: two_sided_p(&t_dist, t_stat),
                    ci_low: coef - t_crit * std_err,
                    ci_high: coef + t_crit * std_err,
                }
            })
            .collect();

        let (f_statistic, f_p_value) = if df_model > 0 {
            let f = ((tss - ssr) / df_model as f64) / sigma2;
            let f_dist = FisherSnedecor::new(df_model as f64, df_resid as f64)
                .map_err(|e| PipelineError::Statistics(e.to_string()))?;
            (f, if f.is_finite() { 1.0 - f_dist.cdf(f) } else { 0.0 })
        } else {
            (f64::NAN, f64::NAN)
        };

        let log_likelihood = -nf / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (ssr / nf).ln() + 1.0);
        let kf = k as f64;

        Ok(FittedModel {
            dependent: dependent.to_string(),
            terms,
            nobs: n,
            df_model,
            df_resid,
            r_squared,
            adj_r_squared,
            f_statistic,
            f_p_value,
            log_likelihood,
            aic: -2.0 * log_likelihood + 2.0 * kf,
            bic: -2.0 * log_likelihood + kf * nf.ln(),
            confidence_level: self.confidence_level,
            dates,
            actual: y.to_vec(),
            fitted: fitted.iter().copied().collect(),
            residuals: residuals.iter().copied().collect(),
        })
    }
}

/// Rank-deficiency error naming the offending terms: constant regressors
/// first, then any term whose Cholesky pivot collapsed against earlier ones.
fn singular(names: &[&str], columns: &[Vec<f64>], pivots: Option<&DVector<f64>>) -> PipelineError {
    let mut culprits: Vec<&str> = names
        .iter()
        .zip(columns)
        .filter(|(_, column)| column.windows(2).all(|w| w[0] == w[1]))
        .map(|(name, _)| *name)
        .collect();
    if let Some(pivots) = pivots {
        let largest = pivots.max();
        for (j, pivot) in pivots.iter().enumerate() {
            let name = if j == 0 { CONST_TERM } else { names[j - 1] };
            if *pivot <= largest * RANK_TOLERANCE && !culprits.contains(&name) {
                culprits.push(name);
            }
        }
    }

    let message = if culprits.is_empty() {
        "XᵀX is singular; regressors are collinear".to_string()
    } else {
        format!(
            "XᵀX is singular; {} constant or collinear with earlier terms",
            culprits.join(", ")
        )
    };
    log::error!("{}", message);
    PipelineError::LinearAlgebra(message)
}

fn two_sided_p(dist: &StudentsT, t: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    (2.0 * (1.0 - dist.cdf(t.abs()))).min(1.0)
}
