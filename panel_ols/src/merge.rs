//! Union-of-dates join of the daily panels.

use std::collections::{BTreeSet, HashSet};

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::io::{column_names, string_values};
use crate::models::{DailyPanel, DATE};

/// All daily panels aligned on one date axis; absent metrics are null.
#[derive(Debug, Clone)]
pub struct MergedPanel {
    frame: DataFrame,
}

impl MergedPanel {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn metric_columns(&self) -> Vec<String> {
        column_names(&self.frame).into_iter().filter(|c| c != DATE).collect()
    }
}

/// Left-join every panel onto the sorted union of their dates.
pub fn merge_panels(panels: &[DailyPanel]) -> Result<MergedPanel> {
    if panels.is_empty() {
        return Err(PipelineError::NoUsableData("no panels to merge".to_string()));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut spine: BTreeSet<String> = BTreeSet::new();
    for panel in panels {
        for column in column_names(panel.frame()) {
            if column != DATE && !seen.insert(column.clone()) {
                return Err(PipelineError::InvalidPanel(format!(
                    "metric column {} appears in more than one panel",
                    column
                )));
            }
        }
        spine.extend(string_values(panel.frame(), DATE)?.into_iter().flatten());
    }

    let dates: Vec<String> = spine.into_iter().collect();
    let mut merged = df!(DATE => dates)?.lazy();
    for panel in panels {
        merged = merged.join(
            panel.frame().clone().lazy(),
            [col(DATE)],
            [col(DATE)],
            JoinArgs::new(JoinType::Left),
        );
    }
    let frame = merged.sort([DATE], Default::default()).collect()?;

    log::info!(
        "merged {} panels into {} dates x {} columns",
        panels.len(),
        frame.height(),
        frame.width()
    );
    Ok(MergedPanel { frame })
}

/// Wrap an already-merged table, e.g. one read back from disk.
impl TryFrom<DataFrame> for MergedPanel {
    type Error = PipelineError;

    fn try_from(frame: DataFrame) -> Result<Self> {
        if !column_names(&frame).iter().any(|c| c == DATE) {
            return Err(PipelineError::InvalidPanel("merged table has no date column".to_string()));
        }
        Ok(Self { frame })
    }
}
