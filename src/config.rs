use anyhow::{Context, Result};
use panel_ols::degree_days::DegreeDayConfig;
use panel_ols::preprocess::DEFAULT_LOG_OFFSET;
use panel_ols::price::DEFAULT_HUB;
use panel_ols::PanelKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Artifact file names, resolved against `output_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub price: String,
    pub load: String,
    pub degree_days: String,
    pub renewable_share: String,
    pub merged: String,
    pub preprocessed: String,
    pub model: String,
    pub coefficients: String,
    pub report: String,
    pub residuals_plot: String,
    pub fitted_plot: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            price: PanelKind::Price.file_name().to_string(),
            load: PanelKind::Load.file_name().to_string(),
            degree_days: PanelKind::DegreeDays.file_name().to_string(),
            renewable_share: PanelKind::RenewableShare.file_name().to_string(),
            merged: "ALL_IN_ONE.csv".to_string(),
            preprocessed: "preprocessed_data.csv".to_string(),
            model: "ols_model.json".to_string(),
            coefficients: "ols_coefficients.csv".to_string(),
            report: "ols_regression_report.md".to_string(),
            residuals_plot: "ols_residuals_analysis.png".to_string(),
            fitted_plot: "ols_fitted_actual.png".to_string(),
        }
    }
}

impl OutputNames {
    pub fn panel(&self, kind: PanelKind) -> &str {
        match kind {
            PanelKind::Price => &self.price,
            PanelKind::Load => &self.load,
            PanelKind::DegreeDays => &self.degree_days,
            PanelKind::RenewableShare => &self.renewable_share,
        }
    }
}

/// Everything a pipeline run needs; every field has a default so a config
/// file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub price_workbook: PathBuf,
    pub load_dir: PathBuf,
    pub weather_dir: PathBuf,
    pub renewables_workbook: PathBuf,
    /// Glob applied inside `load_dir` and `weather_dir`.
    pub csv_pattern: String,
    pub output_dir: PathBuf,
    pub hub: String,
    pub degree_days: DegreeDayConfig,
    pub renewable_keywords: Vec<String>,
    pub log_offset: f64,
    pub outputs: OutputNames,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            price_workbook: PathBuf::from("raw/price/Price.xlsx"),
            load_dir: PathBuf::from("raw/load"),
            weather_dir: PathBuf::from("raw/CDD_HDD"),
            renewables_workbook: PathBuf::from("raw/RenewableShare/IntGenbyFuel2024.xlsx"),
            csv_pattern: "*.csv".to_string(),
            output_dir: PathBuf::from("output"),
            hub: DEFAULT_HUB.to_string(),
            degree_days: DegreeDayConfig::default(),
            renewable_keywords: vec!["wind".to_string(), "solar".to_string()],
            log_offset: DEFAULT_LOG_OFFSET,
            outputs: OutputNames::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Config file if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    pub fn panel_path(&self, kind: PanelKind) -> PathBuf {
        self.output(self.outputs.panel(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_conventional_artifact_names() {
        let config = PipelineConfig::default();
        assert_eq!(config.hub, "HB_BUSAVG");
        assert_eq!(config.log_offset, 0.001);
        assert_eq!(config.degree_days.base_temperature, 65.0);
        assert_eq!(config.panel_path(PanelKind::DegreeDays), PathBuf::from("output/CDD_HDD_Clean.csv"));
        assert_eq!(config.output(&config.outputs.merged), PathBuf::from("output/ALL_IN_ONE.csv"));
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"hub": "HB_NORTH", "degree_days": {"base_temperature": 18.0}, "outputs": {"model": "m.json"}}"#,
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.hub, "HB_NORTH");
        assert_eq!(config.degree_days.base_temperature, 18.0);
        assert_eq!(config.degree_days.tenths_threshold, 200.0);
        assert_eq!(config.outputs.model, "m.json");
        assert_eq!(config.outputs.report, "ols_regression_report.md");
        assert_eq!(config.renewable_keywords, vec!["wind", "solar"]);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(PipelineConfig::load(Some(Path::new("/no/such/pipeline.json"))).is_err());
    }
}
