pub mod error;
pub mod schema;
pub mod coerce;
pub mod models;
pub mod io;
pub mod workbook;
pub mod price;
pub mod load;
pub mod degree_days;
pub mod renewables;
pub mod merge;
pub mod preprocess;
pub mod regression;
pub mod report;
pub mod plot;

pub use error::{PipelineError, Result};
pub use schema::{ColumnMap, ColumnSchema, MatchPolicy, Role, SchemaMismatch};
pub use models::{DailyPanel, FittedModel, PanelKind, TermEstimate};
pub use workbook::{load_workbook, Cell, Sheet, Workbook};
pub use price::PricePanelBuilder;
pub use load::{LoadPanelBuilder, LoadSource};
pub use degree_days::{DegreeDayConfig, DegreeDayPanelBuilder};
pub use renewables::RenewableSharePanelBuilder;
pub use merge::{merge_panels, MergedPanel};
pub use preprocess::{PreprocessSummary, Preprocessor, RegressionDataset};
pub use regression::OlsFitter;
