//! Artifact I/O: CSV tables through polars, the fitted model through serde.

use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::models::{DailyPanel, FittedModel, PanelKind};

/// Read a CSV with a header row, inferring column types.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::SourceNotFound { path: path.to_path_buf() });
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    log::debug!("read {} rows x {} cols from {}", df.height(), df.width(), path.display());
    Ok(df)
}

/// Write `df` as CSV, creating parent directories and overwriting any
/// previous artifact.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)?;
    let mut out = df.clone();
    CsvWriter::new(&mut file).include_header(true).finish(&mut out)?;
    Ok(())
}

pub fn write_panel(panel: &DailyPanel, path: &Path) -> Result<()> {
    write_csv(panel.frame(), path)?;
    log::info!(
        "wrote {:?} panel to {} (rows={})",
        panel.kind(),
        path.display(),
        panel.height()
    );
    Ok(())
}

pub fn read_panel(kind: PanelKind, path: &Path) -> Result<DailyPanel> {
    DailyPanel::new(kind, read_csv(path)?)
}

pub fn write_model(model: &FittedModel, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, model)?;
    Ok(())
}

pub fn read_model(path: &Path) -> Result<FittedModel> {
    if !path.exists() {
        return Err(PipelineError::SourceNotFound { path: path.to_path_buf() });
    }
    let file = File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|c| c.to_string()).collect()
}

/// Column rendered as text; numbers are printed, nulls stay `None`.
pub fn string_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(column)?.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

/// Column coerced to f64; unparsable cells become `None`.
pub fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(column)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

pub fn is_numeric_column(df: &DataFrame, column: &str) -> Result<bool> {
    Ok(df.column(column)?.dtype().is_numeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DATE, LOAD};

    #[test]
    fn missing_file_is_source_not_found() {
        let err = read_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }

    #[test]
    fn panel_round_trip_keeps_rows_and_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("Load_Clean.csv");
        let df = df!(
            DATE => ["2024-01-01", "2024-01-02", "2024-01-03"],
            LOAD => [Some(41000.5), None, Some(39000.0)],
        )
        .unwrap();
        let panel = DailyPanel::new(PanelKind::Load, df).unwrap();
        write_panel(&panel, &path).unwrap();

        let back = read_panel(PanelKind::Load, &path).unwrap();
        assert_eq!(back.height(), 3);
        assert_eq!(column_names(back.frame()), vec![DATE.to_string(), LOAD.to_string()]);
        assert_eq!(back.values(LOAD).unwrap(), vec![Some(41000.5), None, Some(39000.0)]);
    }

    #[test]
    fn text_cells_coerce_to_null_floats() {
        let df = df!("v" => ["1.5", "M", ""]).unwrap();
        assert_eq!(float_values(&df, "v").unwrap(), vec![Some(1.5), None, None]);
        assert!(!is_numeric_column(&df, "v").unwrap());
    }
}
