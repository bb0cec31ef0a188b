use anyhow::{bail, Context, Result};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use panel_ols::io::{
    column_names, float_values, read_csv, read_model, read_panel, string_values, write_csv, write_model,
    write_panel,
};
use panel_ols::models::DATE;
use panel_ols::report::ReportSources;
use panel_ols::{
    load_workbook, merge_panels, plot, report, DegreeDayPanelBuilder, LoadPanelBuilder, MergedPanel, OlsFitter,
    PanelKind, PipelineError, PricePanelBuilder, Preprocessor, RegressionDataset, RenewableSharePanelBuilder,
};
use polars::prelude::*;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;

/// Sorted list of files in `dir` matching `pattern`.
pub fn discover_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::SourceNotFound { path: dir.to_path_buf() }.into());
    }
    let full = dir.join(pattern);
    let mut files: Vec<PathBuf> = glob(&full.to_string_lossy())
        .with_context(|| format!("bad file pattern {}", full.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(PipelineError::SourceNotFound { path: full }.into());
    }
    Ok(files)
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?,
    );
    Ok(pb)
}

pub fn run_price(config: &PipelineConfig) -> Result<()> {
    println!("\n💲 Building daily {} price panel", config.hub);
    let workbook = load_workbook(&config.price_workbook)
        .with_context(|| format!("loading price workbook {}", config.price_workbook.display()))?;
    let panel = PricePanelBuilder::new(config.hub.as_str()).build(&workbook).context("building price panel")?;
    let out = config.panel_path(PanelKind::Price);
    write_panel(&panel, &out)?;
    println!("  ✅ {} days → {}", panel.height(), out.display());
    Ok(())
}

pub fn run_load(config: &PipelineConfig) -> Result<()> {
    println!("\n⚡ Building daily load panel");
    let files = discover_files(&config.load_dir, &config.csv_pattern)?;
    let pb = progress_bar(files.len())?;
    let mut builder = LoadPanelBuilder::new();
    for file in &files {
        pb.set_message(file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default());
        builder.add_file(file).with_context(|| format!("reading load file {}", file.display()))?;
        pb.inc(1);
    }
    pb.finish_with_message("load files read");

    let panel = builder.finish().context("building load panel")?;
    let out = config.panel_path(PanelKind::Load);
    write_panel(&panel, &out)?;
    println!("  ✅ {} files, {} days → {}", files.len(), panel.height(), out.display());
    Ok(())
}

pub fn run_degree_days(config: &PipelineConfig) -> Result<()> {
    println!("\n🌡️  Building daily degree-day panel");
    let files = discover_files(&config.weather_dir, &config.csv_pattern)?;
    let pb = progress_bar(files.len())?;
    let mut builder = DegreeDayPanelBuilder::new(config.degree_days);
    for file in &files {
        builder.add_file(file).with_context(|| format!("reading weather file {}", file.display()))?;
        pb.inc(1);
    }
    pb.finish_with_message("weather files read");

    let panel = builder.finish().context("building degree-day panel")?;
    let out = config.panel_path(PanelKind::DegreeDays);
    write_panel(&panel, &out)?;
    println!("  ✅ {} days → {}", panel.height(), out.display());
    Ok(())
}

pub fn run_renewables(config: &PipelineConfig) -> Result<()> {
    println!("\n🌬️  Building daily renewable-share panel");
    let workbook = load_workbook(&config.renewables_workbook)
        .with_context(|| format!("loading fuel-mix workbook {}", config.renewables_workbook.display()))?;
    let panel = RenewableSharePanelBuilder::new(config.renewable_keywords.clone())
        .build(&workbook)
        .context("building renewable-share panel")?;
    let out = config.panel_path(PanelKind::RenewableShare);
    write_panel(&panel, &out)?;
    println!("  ✅ {} days → {}", panel.height(), out.display());
    Ok(())
}

pub fn run_merge(config: &PipelineConfig) -> Result<()> {
    println!("\n🔗 Merging daily panels");
    let panels = PanelKind::ALL
        .iter()
        .map(|kind| {
            let path = config.panel_path(*kind);
            read_panel(*kind, &path).with_context(|| format!("reading {:?} panel {}", kind, path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let merged = merge_panels(&panels)?;
    let out = config.output(&config.outputs.merged);
    write_csv(merged.frame(), &out)?;
    println!("  ✅ {} dates x {} metrics → {}", merged.height(), merged.metric_columns().len(), out.display());
    Ok(())
}

pub fn run_preprocess(config: &PipelineConfig) -> Result<()> {
    println!("\n🧹 Preprocessing merged panel");
    let input = config.output(&config.outputs.merged);
    let merged = MergedPanel::try_from(read_csv(&input).with_context(|| format!("reading {}", input.display()))?)?;
    let (dataset, summary) = Preprocessor::new(config.log_offset).run(merged.frame())?;

    let out = config.output(&config.outputs.preprocessed);
    write_csv(dataset.frame(), &out)?;
    println!(
        "  ✅ {} → {} rows (negative/missing price {}, incomplete {}, non-finite {}) → {}",
        summary.input_rows,
        summary.output_rows,
        summary.dropped_negative_price,
        summary.dropped_incomplete,
        summary.dropped_non_finite,
        out.display()
    );
    Ok(())
}

pub fn run_fit(config: &PipelineConfig) -> Result<()> {
    println!("\n📈 Fitting OLS");
    let input = config.output(&config.outputs.preprocessed);
    let dataset = RegressionDataset::try_from(read_csv(&input).with_context(|| format!("reading {}", input.display()))?)?;
    let model = OlsFitter::default().fit(&dataset)?;

    let out = config.output(&config.outputs.model);
    write_model(&model, &out)?;
    println!("  ✅ n={}, R²={:.4} → {}", model.nobs, model.r_squared, out.display());
    for term in &model.terms {
        println!("    {:<18} {:>12.6}  (p={:.4})", term.term, term.coef, term.p_value);
    }
    Ok(())
}

pub fn run_report(config: &PipelineConfig) -> Result<()> {
    println!("\n📝 Writing regression report");
    let model_path = config.output(&config.outputs.model);
    let model = read_model(&model_path).with_context(|| format!("reading model {}", model_path.display()))?;

    let coefficients = config.output(&config.outputs.coefficients);
    report::write_coefficients(&model, &coefficients)?;
    let markdown = config.output(&config.outputs.report);
    let sources = ReportSources::new(config.outputs.model.as_str(), config.outputs.preprocessed.as_str());
    report::write_markdown(&model, &sources, &markdown)?;
    println!("  ✅ {} and {}", coefficients.display(), markdown.display());
    Ok(())
}

pub fn run_plot(config: &PipelineConfig) -> Result<()> {
    println!("\n📊 Rendering diagnostic plots");
    let model_path = config.output(&config.outputs.model);
    let model = read_model(&model_path).with_context(|| format!("reading model {}", model_path.display()))?;

    let residuals = config.output(&config.outputs.residuals_plot);
    plot::residuals_vs_fitted(&model, &residuals)?;
    let fitted = config.output(&config.outputs.fitted_plot);
    plot::actual_vs_fitted(&model, &fitted)?;
    println!("  ✅ {} and {}", residuals.display(), fitted.display());
    Ok(())
}

/// Date-axis checks for one CSV artifact.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ArtifactCheck {
    pub rows: usize,
    pub duplicate_dates: usize,
    pub unsorted: bool,
    pub null_counts: Vec<(String, usize)>,
}

impl ArtifactCheck {
    pub fn issues(&self) -> usize {
        self.duplicate_dates + usize::from(self.unsorted)
    }
}

pub fn check_artifact(path: &Path) -> Result<ArtifactCheck> {
    let df = read_csv(path)?;
    if !column_names(&df).iter().any(|c| c == DATE) {
        bail!("{} has no {} column", path.display(), DATE);
    }

    let duplicates = df
        .clone()
        .lazy()
        .group_by([col(DATE)])
        .agg([len().alias("count")])
        .filter(col("count").gt(lit(1)))
        .collect()?;

    let dates: Vec<String> = string_values(&df, DATE)?.into_iter().flatten().collect();
    let unsorted = dates.windows(2).any(|w| w[0] > w[1]);

    let mut null_counts = Vec::new();
    for column in column_names(&df).into_iter().filter(|c| c != DATE) {
        let nulls = float_values(&df, &column)?.iter().filter(|v| v.is_none()).count();
        null_counts.push((column, nulls));
    }

    Ok(ArtifactCheck { rows: df.height(), duplicate_dates: duplicates.height(), unsorted, null_counts })
}

/// Check every panel and the merged table; returns the number of issues.
pub fn run_verify(config: &PipelineConfig) -> Result<usize> {
    println!("\n🔍 Data Quality Verification");
    println!("{}", "=".repeat(60));

    let mut targets: Vec<PathBuf> = PanelKind::ALL.iter().map(|k| config.panel_path(*k)).collect();
    targets.push(config.output(&config.outputs.merged));
    targets.push(config.output(&config.outputs.preprocessed));

    let mut total_issues = 0;
    for path in targets {
        if !path.exists() {
            println!("\n  ⏭️  {} not produced yet", path.display());
            continue;
        }
        println!("\n  Verifying: {}", path.display());
        let check = check_artifact(&path)?;

        if check.duplicate_dates > 0 {
            println!("    ❌ Found {} duplicated dates", check.duplicate_dates);
        } else {
            println!("    ✅ No duplicate dates");
        }
        if check.unsorted {
            println!("    ⚠️  Dates are not sorted");
        } else {
            println!("    ✅ Dates are sorted");
        }
        println!("    📊 Total rows: {}", check.rows);
        for (column, nulls) in &check.null_counts {
            if *nulls > 0 {
                println!("    📊 {}: {} empty", column, nulls);
            }
        }
        total_issues += check.issues();
    }

    println!("\n{}", "=".repeat(60));
    if total_issues == 0 {
        println!("✅ Data quality verification passed! No issues found.");
    } else {
        println!("⚠️  Data quality verification found {} issues", total_issues);
    }
    Ok(total_issues)
}

pub fn run_all(config: &PipelineConfig) -> Result<()> {
    run_price(config)?;
    run_load(config)?;
    run_degree_days(config)?;
    run_renewables(config)?;
    run_merge(config)?;
    run_preprocess(config)?;
    run_fit(config)?;
    run_report(config)?;
    run_plot(config)?;
    Ok(())
}
