use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use panel_ols::io::{read_csv, read_model, read_panel, write_csv, write_model, write_panel};
use panel_ols::models::{CDD, HDD, LN_LOAD, LN_PRICE, RENEWABLE_SHARE};
use panel_ols::regression::CONST_TERM;
use panel_ols::report::ReportSources;
use panel_ols::{
    merge_panels, report, Cell, DegreeDayConfig, DegreeDayPanelBuilder, LoadPanelBuilder, MergedPanel, OlsFitter,
    PanelKind, PricePanelBuilder, Preprocessor, RegressionDataset, RenewableSharePanelBuilder, Sheet, Workbook,
};

const DAYS: u32 = 30;

fn date(day: u32) -> String {
    format!("2024-01-{:02}", day)
}

fn us_date(day: u32) -> String {
    format!("01/{:02}/2024", day)
}

fn price_workbook() -> Workbook {
    let header: Vec<Cell> = ["Delivery Date", "Delivery Hour", "Settlement Point Name", "Settlement Point Price"]
        .iter()
        .map(|s| Cell::text(s))
        .collect();
    let mut rows = vec![header];
    // The last day has no price.
    for day in 1..DAYS {
        for hour in 1..=2 {
            let price = 20.0 + day as f64 * 1.5 + (day % 4) as f64 + hour as f64;
            rows.push(vec![
                Cell::text(&us_date(day)),
                Cell::Number(hour as f64),
                Cell::text("HB_BUSAVG"),
                Cell::Number(price),
            ]);
            rows.push(vec![
                Cell::text(&us_date(day)),
                Cell::Number(hour as f64),
                Cell::text("HB_WEST"),
                Cell::Number(-50.0),
            ]);
        }
    }
    Workbook::new(vec![Sheet::new("Sheet1", rows)])
}

fn write_load_files(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    for chunk in 0..3 {
        let mut text = String::from("OperDay,HourEnding,COAST,NORTH,DSTFlag\n");
        for day in (chunk * 10 + 1)..=(chunk * 10 + 10) {
            for hour in 1..=2 {
                let coast = 30_000.0 + (day * 173 % 41) as f64 * 250.0 + hour as f64 * 10.0;
                writeln!(text, "{},{:02}:00,{},{},N", us_date(day), hour, coast, 9_000.0 + day as f64 * 20.0).unwrap();
            }
        }
        fs::write(dir.join(format!("load_{chunk}.csv")), text).unwrap();
    }
}

fn write_weather_file(path: &Path) {
    // Tenths of a degree, no TAVG: exercises both heuristics.
    let mut text = String::from("date,datatype,value,station_id\n");
    for day in 1..=DAYS {
        writeln!(text, "{},TMAX,{},A", date(day), 700 + day * 10).unwrap();
        writeln!(text, "{},TMIN,{},A", date(day), 500 + day * 10).unwrap();
        writeln!(text, "{},TMAX,{},B", date(day), 720 + day * 10).unwrap();
        writeln!(text, "{},TMIN,{},B", date(day), 480 + day * 10).unwrap();
        writeln!(text, "{},PRCP,3,B", date(day)).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn fuel_workbook() -> Workbook {
    let mut rows = vec![
        vec![Cell::text("Generation by fuel"), Cell::Empty, Cell::Empty],
        vec![Cell::Empty, Cell::Empty, Cell::Empty],
        vec![Cell::text("Date"), Cell::text("Fuel"), Cell::text("Total")],
    ];
    for day in 1..=DAYS {
        let wind = 100.0 + (day * 37 % 17) as f64 * 10.0;
        rows.push(vec![Cell::text(&us_date(day)), Cell::text("Wind"), Cell::Number(wind)]);
        rows.push(vec![Cell::text(&us_date(day)), Cell::text("Solar"), Cell::Number(40.0 + day as f64)]);
        rows.push(vec![Cell::text(&us_date(day)), Cell::text("Gas-CC"), Cell::Number(600.0)]);
    }
    Workbook::new(vec![Sheet::new("Jan", rows), Sheet::new("Summary", vec![vec![Cell::text("ignored")]])])
}

#[test]
fn raw_inputs_to_report_through_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let raw = tmp.path().join("raw");
    let out = tmp.path().join("out");

    // Panels
    let price = PricePanelBuilder::default().build(&price_workbook()).unwrap();
    write_panel(&price, &out.join(PanelKind::Price.file_name())).unwrap();

    write_load_files(&raw.join("load"));
    let mut load = LoadPanelBuilder::new();
    let mut load_files: Vec<_> = fs::read_dir(raw.join("load")).unwrap().map(|e| e.unwrap().path()).collect();
    load_files.sort();
    for file in &load_files {
        load.add_file(file).unwrap();
    }
    write_panel(&load.finish().unwrap(), &out.join(PanelKind::Load.file_name())).unwrap();

    write_weather_file(&raw.join("weather.csv"));
    let mut weather = DegreeDayPanelBuilder::new(DegreeDayConfig::default());
    weather.add_file(&raw.join("weather.csv")).unwrap();
    let degree_days = weather.finish().unwrap();
    // Day 1: stations average to TMAX 72 and TMIN 50, so TAVG is 61
    assert_eq!(degree_days.value_on("2024-01-01", HDD).unwrap(), Some(4.0));
    assert_eq!(degree_days.value_on("2024-01-01", CDD).unwrap(), Some(0.0));
    write_panel(&degree_days, &out.join(PanelKind::DegreeDays.file_name())).unwrap();

    let share = RenewableSharePanelBuilder::default().build(&fuel_workbook()).unwrap();
    write_panel(&share, &out.join(PanelKind::RenewableShare.file_name())).unwrap();

    // Merge from disk
    let panels: Vec<_> = PanelKind::ALL
        .iter()
        .map(|kind| read_panel(*kind, &out.join(kind.file_name())).unwrap())
        .collect();
    for panel in &panels {
        let dates = panel.dates().unwrap();
        assert!(dates.windows(2).all(|w| w[0] < w[1]), "{:?} dates not strictly increasing", panel.kind());
    }
    let merged = merge_panels(&panels).unwrap();
    assert_eq!(merged.height(), DAYS as usize);
    write_csv(merged.frame(), &out.join("ALL_IN_ONE.csv")).unwrap();

    // Preprocess from disk
    let merged = MergedPanel::try_from(read_csv(&out.join("ALL_IN_ONE.csv")).unwrap()).unwrap();
    let (dataset, summary) = Preprocessor::default().run(merged.frame()).unwrap();
    assert_eq!(summary.input_rows, DAYS as usize);
    assert_eq!(summary.dropped_negative_price, 1);
    assert_eq!(summary.output_rows, DAYS as usize - 1);
    write_csv(dataset.frame(), &out.join("preprocessed_data.csv")).unwrap();

    // Fit from disk
    let dataset = RegressionDataset::try_from(read_csv(&out.join("preprocessed_data.csv")).unwrap()).unwrap();
    let model = OlsFitter::default().fit(&dataset).unwrap();
    assert_eq!(model.dependent, LN_PRICE);
    assert_eq!(model.nobs, DAYS as usize - 1);
    assert_eq!(model.regressors(), vec![LN_LOAD, CDD, HDD, RENEWABLE_SHARE]);
    assert!(model.term(CONST_TERM).is_some());
    assert!((0.0..=1.0).contains(&model.r_squared));
    write_model(&model, &out.join("ols_model.json")).unwrap();

    // Report consumes only the persisted model
    let persisted = read_model(&out.join("ols_model.json")).unwrap();
    assert_eq!(persisted.terms.len(), 5);
    report::write_coefficients(&persisted, &out.join("ols_coefficients.csv")).unwrap();
    let sources = ReportSources::new("ols_model.json", "preprocessed_data.csv");
    report::write_markdown(&persisted, &sources, &out.join("ols_regression_report.md")).unwrap();

    let coefficients = fs::read_to_string(out.join("ols_coefficients.csv")).unwrap();
    assert_eq!(coefficients.lines().count(), 6);
    assert!(coefficients.starts_with("term,coef,std_err,t_or_z,p_value,ci_low,ci_high"));
    let markdown = fs::read_to_string(out.join("ols_regression_report.md")).unwrap();
    assert!(markdown.contains("| N (obs) | 29 |"));
    assert!(markdown.contains("- Data file: `preprocessed_data.csv`"));
    assert!(markdown.contains("Confidence intervals are 95%."));
}

#[test]
fn rerunning_a_stage_overwrites_identically() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("RenewableShare_Clean.csv");

    let builder = RenewableSharePanelBuilder::default();
    write_panel(&builder.build(&fuel_workbook()).unwrap(), &path).unwrap();
    let first = fs::read_to_string(&path).unwrap();
    write_panel(&builder.build(&fuel_workbook()).unwrap(), &path).unwrap();
    assert_eq!(first, fs::read_to_string(&path).unwrap());
}
