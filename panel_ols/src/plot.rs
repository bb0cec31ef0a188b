//! Diagnostic charts for a persisted model.

use std::fmt::Debug;
use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;

use crate::error::{PipelineError, Result};
use crate::models::FittedModel;

const SIZE: (u32, u32) = (900, 550);

fn plot_err<E: Debug>(err: E) -> PipelineError {
    PipelineError::Plot(format!("{:?}", err))
}

/// Axis range covering `values` with 5% headroom on both sides.
pub fn padded_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if lo > hi {
        return -1.0..1.0;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
    (lo - pad)..(hi + pad)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn require_observations(model: &FittedModel) -> Result<()> {
    if model.fitted.is_empty() || model.fitted.len() != model.residuals.len() || model.fitted.len() != model.actual.len() {
        return Err(PipelineError::Plot(
            "model carries no per-observation fitted values".to_string(),
        ));
    }
    Ok(())
}

/// Scatter of residuals against fitted values, with a zero line.
pub fn residuals_vs_fitted(model: &FittedModel, path: &Path) -> Result<()> {
    require_observations(model)?;
    ensure_parent(path)?;

    let x_range = padded_range(&model.fitted);
    let y_range = padded_range(model.residuals.iter().chain(std::iter::once(&0.0)));

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("OLS Residuals vs Fitted", ("sans-serif", 26).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.clone(), y_range)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Fitted")
        .y_desc("Residual")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(
            model
                .fitted
                .iter()
                .zip(&model.residuals)
                .map(|(f, r)| Circle::new((*f, *r), 3, BLUE.filled())),
        )
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(vec![(x_range.start, 0.0), (x_range.end, 0.0)], &BLACK))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    log::info!("saved residuals plot to {}", path.display());
    Ok(())
}

/// Actual and fitted values over the observation index.
pub fn actual_vs_fitted(model: &FittedModel, path: &Path) -> Result<()> {
    require_observations(model)?;
    ensure_parent(path)?;

    let n = model.actual.len();
    let y_range = padded_range(model.actual.iter().chain(&model.fitted));

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("OLS: Actual vs Fitted ({})", model.dependent),
            ("sans-serif", 26).into_font(),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(1usize..n.max(2), y_range)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Observation")
        .y_desc(model.dependent.as_str())
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            model.actual.iter().enumerate().map(|(i, v)| (i + 1, *v)),
            &BLUE,
        ))
        .map_err(plot_err)?
        .label("Actual")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .draw_series(LineSeries::new(
            model.fitted.iter().enumerate().map(|(i, v)| (i + 1, *v)),
            &RED,
        ))
        .map_err(plot_err)?
        .label("Fitted")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    log::info!("saved actual-vs-fitted plot to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_pads_both_sides() {
        let r = padded_range(&[0.0, 10.0]);
        assert_eq!(r, -0.5..10.5);
    }

    #[test]
    fn flat_and_empty_ranges_stay_non_degenerate() {
        let flat = padded_range(&[4.0, 4.0]);
        assert!(flat.start < 4.0 && 4.0 < flat.end);
        assert_eq!(padded_range(&Vec::<f64>::new()), -1.0..1.0);
        assert_eq!(padded_range(&[f64::NAN, 2.0, 3.0]).start, 2.0 - 0.05);
    }

    #[test]
    fn model_without_observations_is_rejected() {
        let model: FittedModel = serde_json::from_str(
            r#"{"dependent":"y","terms":[],"nobs":0,"df_model":0,"df_resid":0,
                "r_squared":0.0,"adj_r_squared":0.0,"f_statistic":0.0,"f_p_value":1.0,
                "log_likelihood":0.0,"aic":0.0,"bic":0.0,
                "dates":[],"actual":[],"fitted":[],"residuals":[]}"#,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = residuals_vs_fitted(&model, &dir.path().join("r.png")).unwrap_err();
        assert!(matches!(err, PipelineError::Plot(_)));
    }
}
