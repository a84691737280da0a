use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use eframe::egui;

mod app;
mod color;
mod config;
mod data;
mod error;
mod export;
mod state;
#[cfg(test)]
mod test_utils;
mod ui;

use app::DashboardApp;
use config::{load_config, DashboardConfig};
use data::filter::FilterSet;
use data::loader::{load_file, LoadOptions, SheetSelector};
use data::model::Dataset;
use export::{export_html, report_title, Report};
use state::AppState;

/// Interactive dashboard for tabular data files
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Explore CSV, spreadsheet and Parquet files as an interactive dashboard or a static HTML report"
)]
struct Args {
    /// Data file (.csv, .tsv, .gz, .xlsx, .xls, .ods, .parquet); a file dialog is offered when omitted
    file: Option<PathBuf>,

    /// Worksheet to read from a workbook, by name or 0-based index
    #[arg(long)]
    sheet: Option<SheetSelector>,

    /// Write a static HTML report to PATH instead of opening a window
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Dashboard / report title
    #[arg(long)]
    title: Option<String>,

    /// JSON filter set applied before export or as the initial state
    #[arg(long, value_name = "PATH")]
    filters: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let loaded = load_config(args.config.as_deref());
    if let Some(warning) = &loaded.warning {
        log::warn!("{warning}; using defaults");
    }
    let mut config = loaded.config;
    if let Some(title) = &args.title {
        config.title = Some(title.clone());
    }

    let filters = match &args.filters {
        Some(path) => read_filters(path)?,
        None => FilterSet::default(),
    };

    match &args.export {
        Some(out) => {
            let Some(file) = &args.file else {
                bail!("--export needs a data FILE");
            };
            run_export(file, out, args.sheet, &filters, &config)
        }
        None => run_live(args.file.as_deref(), args.sheet, filters, config),
    }
}

fn read_filters(path: &Path) -> Result<FilterSet> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading filter file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing filter file {}", path.display()))
}

/// Headless path: load, filter, summarise and write the report.
fn run_export(
    file: &Path,
    out: &Path,
    sheet: Option<SheetSelector>,
    filters: &FilterSet,
    config: &DashboardConfig,
) -> Result<()> {
    let options = LoadOptions::new(sheet, &config.missing_tokens);
    let table = load_file(file, &options).with_context(|| format!("loading {}", file.display()))?;
    let dataset = Dataset::from_table(table, &config.inference);

    let title = report_title(config.title.as_deref(), Some(file));
    let (report, _) = Report::build(title, &dataset, filters, &config.summary);
    for warning in &report.warnings {
        log::warn!("{warning}");
    }
    export_html(out, &report)
}

fn run_live(
    file: Option<&Path>,
    sheet: Option<SheetSelector>,
    filters: FilterSet,
    config: DashboardConfig,
) -> Result<()> {
    let mut state = AppState::new(config);
    state.sheet = sheet;
    state.filters = filters;
    if let Some(path) = file {
        // A failed load leaves an empty window with the error in the status line.
        let _ = state.load_path(path);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };

    let window_title = state.title();
    eframe::run_native(
        &window_title,
        options,
        Box::new(move |_cc| Ok(Box::new(DashboardApp::new(state)))),
    )
    .map_err(|e| anyhow::anyhow!("window error: {e}"))
}
