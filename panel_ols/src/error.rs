use std::path::PathBuf;

use crate::schema::SchemaMismatch;

/// Errors raised by the panel builders, the merger, the preprocessor and the
/// regression fitter.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("schema mismatch in {origin}: missing {missing:?}; available columns: {available:?}")]
    SchemaMismatch {
        origin: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("no usable data: {0}")]
    NoUsableData(String),

    #[error("could not coerce {column} value {value:?} in {origin}")]
    ValueCoercion {
        origin: String,
        column: String,
        value: String,
    },

    #[error("invalid panel: {0}")]
    InvalidPanel(String),

    #[error("linear algebra error: {0}")]
    LinearAlgebra(String),

    #[error("statistics error: {0}")]
    Statistics(String),

    #[error("plot error: {0}")]
    Plot(String),

    #[error("data processing error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Attach the origin (file, sheet) to a normalizer failure.
    pub fn schema(origin: impl Into<String>, mismatch: SchemaMismatch) -> Self {
        Self::SchemaMismatch {
            origin: origin.into(),
            missing: mismatch.missing,
            available: mismatch.available,
        }
    }

    /// Coercion failures only exclude rows; everything else aborts the stage.
    pub fn is_row_level(&self) -> bool {
        matches!(self, Self::ValueCoercion { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
