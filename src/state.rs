use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::DashboardConfig;
use crate::data::controls::{filter_controls, FilterControl};
use crate::data::filter::{build_mask, FilterCriterion, FilterSet, RowMask};
use crate::data::loader::{load_file, LoadOptions, SheetSelector};
use crate::data::model::{ColumnType, Dataset};
use crate::data::summary::{summarize_all, ColumnSummary};
use crate::error::LoadError;
use crate::export::{export_html, report_title, write_filtered_csv, Report};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: DashboardConfig,

    /// Worksheet to read when opening a workbook.
    pub sheet: Option<SheetSelector>,

    /// File the dataset came from.
    pub source: Option<PathBuf>,

    /// Loaded dataset (None until user loads a file).
    pub dataset: Option<Dataset>,

    /// The single source of truth for what is filtered.
    pub filters: FilterSet,

    /// One control per filterable column, in column order.
    pub controls: Vec<(String, FilterControl)>,

    /// Rows passing the current filters (cached).
    pub mask: RowMask,

    /// Per-column summaries over `mask` (cached).
    pub summaries: Vec<ColumnSummary>,

    /// Criteria dropped by the last mask evaluation.
    pub warnings: Vec<String>,

    /// Edit buffers for the search boxes, keyed by column.
    pub search_inputs: BTreeMap<String, String>,

    /// Edit buffer for the global search box.
    pub global_search_input: String,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DashboardConfig::default())
    }
}

impl AppState {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            sheet: None,
            source: None,
            dataset: None,
            filters: FilterSet::default(),
            controls: Vec::new(),
            mask: RowMask::all(0),
            summaries: Vec::new(),
            warnings: Vec::new(),
            search_inputs: BTreeMap::new(),
            global_search_input: String::new(),
            status_message: None,
        }
    }

    /// Load, infer and ingest a file. On failure the previous dataset stays.
    pub fn load_path(&mut self, path: &Path) -> Result<(), LoadError> {
        let options = LoadOptions::new(self.sheet.clone(), &self.config.missing_tokens);
        match load_file(path, &options) {
            Ok(table) => {
                let dataset = Dataset::from_table(table, &self.config.inference);
                self.source = Some(path.to_path_buf());
                self.set_dataset(dataset);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load {}: {e}", path.display());
                self.status_message = Some(format!("Error: {e}"));
                Err(e)
            }
        }
    }

    /// Ingest a newly loaded dataset and initialise controls.
    ///
    /// Filters already in place (e.g. from the command line) are kept and
    /// re-validated against the new columns.
    pub fn set_dataset(&mut self, dataset: Dataset) {
        if dataset.len() > self.config.large_dataset_threshold {
            log::warn!(
                "Dataset has {} rows (over {}); filtering may be slow",
                dataset.len(),
                self.config.large_dataset_threshold
            );
        }
        self.controls = filter_controls(&dataset, &self.config.controls);
        self.search_inputs = self
            .filters
            .criteria()
            .filter_map(|(col, c)| match c {
                FilterCriterion::TextSearch { query } => Some((col.to_string(), query.clone())),
                _ => None,
            })
            .collect();
        self.global_search_input = self.filters.global_search().unwrap_or("").to_string();

        self.dataset = Some(dataset);
        self.status_message = None;
        self.refilter();
    }

    /// Recompute the mask and summaries after a filter change.
    pub fn refilter(&mut self) {
        if let Some(ds) = &self.dataset {
            let outcome = build_mask(ds, &self.filters);
            self.summaries = summarize_all(ds, &outcome.mask, &self.config.summary);
            self.warnings = outcome.warnings.iter().map(ToString::to_string).collect();
            self.mask = outcome.mask;
        }
    }

    /// Replace (or clear, with `None`) the criterion on a column.
    pub fn set_criterion(&mut self, column: &str, criterion: Option<FilterCriterion>) {
        match criterion {
            Some(c) => {
                self.filters.set(column, c);
            }
            None => {
                self.filters.remove(column);
            }
        }
        self.refilter();
    }

    pub fn set_global_search(&mut self, query: &str) {
        self.filters.set_global_search(query);
        self.refilter();
    }

    /// Drop every criterion and the global search.
    pub fn reset_filters(&mut self) {
        self.filters.clear();
        self.search_inputs.clear();
        self.global_search_input.clear();
        self.refilter();
    }

    /// Report title: the configured one, else the file name.
    pub fn title(&self) -> String {
        report_title(self.config.title.as_deref(), self.source.as_deref())
    }

    /// Filtered and total row counts plus columns per type.
    pub fn dataset_info(&self) -> Option<String> {
        let ds = self.dataset.as_ref()?;
        let per_type: Vec<String> = ColumnType::ALL
            .iter()
            .map(|kind| (kind, ds.count_of(*kind)))
            .filter(|(_, n)| *n > 0)
            .map(|(kind, n)| format!("{n} {kind}"))
            .collect();
        Some(format!(
            "{} of {} rows · {} columns ({})",
            self.mask.count(),
            ds.len(),
            ds.columns().len(),
            per_type.join(", ")
        ))
    }

    /// Write the static report for the current filters.
    pub fn export_report(&self, path: &Path) -> anyhow::Result<()> {
        let ds = self.dataset.as_ref().context("no dataset loaded")?;
        let (report, _) = Report::build(self.title(), ds, &self.filters, &self.config.summary);
        export_html(path, &report)
    }

    /// Write the surviving rows as CSV. Returns the number of rows written.
    pub fn save_filtered_csv(&self, path: &Path) -> anyhow::Result<usize> {
        let ds = self.dataset.as_ref().context("no dataset loaded")?;
        let file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let written = write_filtered_csv(ds, &self.mask, BufWriter::new(file))
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("Saved {written} filtered rows to {}", path.display());
        Ok(written)
    }
}
