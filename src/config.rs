use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

/// Thresholds used when classifying columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Fraction of non-missing cells allowed to fail parsing before a rule
    /// is rejected (0.0 - 1.0).
    pub parse_tolerance: f64,
    /// Maximum distinct literals for a Boolean column.
    pub boolean_max_distinct: usize,
    /// Distinct-value floor for Categorical, regardless of row count.
    pub categorical_min_distinct: usize,
    /// Distinct-value limit for Categorical as a fraction of the row count.
    pub categorical_row_fraction: f64,
    /// Categorical values must repeat: distinct / non-missing stays strictly
    /// below this ratio. At 1.0 a column whose values are all unique is
    /// never Categorical.
    pub categorical_max_unique_ratio: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            parse_tolerance: 0.01,
            boolean_max_distinct: 2,
            categorical_min_distinct: 20,
            categorical_row_fraction: 0.05,
            categorical_max_unique_ratio: 1.0,
        }
    }
}

impl InferenceConfig {
    /// Same thresholds, different parse tolerance (clamped to 0.0 - 1.0).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.parse_tolerance = tolerance.clamp(0.0, 1.0);
        self
    }

    /// Number of unparseable cells tolerated among `total` non-missing ones.
    pub fn allowed_failures(&self, total: usize) -> usize {
        (self.parse_tolerance.clamp(0.0, 1.0) * total as f64).floor() as usize
    }

    /// Upper bound on distinct values for a Categorical column of `rows` rows.
    pub fn categorical_limit(&self, rows: usize) -> usize {
        let relative = (self.categorical_row_fraction * rows as f64).floor() as usize;
        self.categorical_min_distinct.max(relative)
    }
}

/// Chart and statistics settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub top_k: usize,
    pub histogram_bins: usize,
    /// Spans up to this many days are bucketed per day.
    pub daily_max_span_days: i64,
    /// Spans up to this many days are bucketed per week, longer ones per month.
    pub weekly_max_span_days: i64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            histogram_bins: 30,
            daily_max_span_days: 90,
            weekly_max_span_days: 730,
        }
    }
}

/// Filter-control settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Maximum number of choices offered by a multi-select control.
    pub max_choices: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { max_choices: 20 }
    }
}

/// Top-level settings, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Explicit title; the source file name is used when unset.
    pub title: Option<String>,
    pub max_preview_rows: usize,
    pub large_dataset_threshold: usize,
    /// Cell contents (after trimming) treated as missing.
    pub missing_tokens: Vec<String>,
    pub inference: InferenceConfig,
    pub summary: SummaryConfig,
    pub controls: ControlConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: None,
            max_preview_rows: 200,
            large_dataset_threshold: 500_000,
            missing_tokens: ["", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "#N/A", "<NA>"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            inference: InferenceConfig::default(),
            summary: SummaryConfig::default(),
            controls: ControlConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Result of loading configuration
pub struct ConfigResult {
    pub config: DashboardConfig,
    pub warning: Option<String>,
}

/// Load configuration from an optional JSON file.
///
/// Returns defaults when no path is given, and defaults plus a warning when
/// the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> ConfigResult {
    let Some(path) = path else {
        return ConfigResult {
            config: DashboardConfig::default(),
            warning: None,
        };
    };

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::error!("Failed to read config file {}: {e}", path.display());
            return ConfigResult {
                config: DashboardConfig::default(),
                warning: Some(format!("Failed to read config: {e}")),
            };
        }
    };

    match serde_json::from_str::<DashboardConfig>(&contents) {
        Ok(config) => {
            log::debug!("Config parsed from {}", path.display());
            ConfigResult {
                config,
                warning: None,
            }
        }
        Err(e) => {
            log::error!("Failed to parse config file {}: {e}", path.display());
            ConfigResult {
                config: DashboardConfig::default(),
                warning: Some(format!("Invalid config: {e}")),
            }
        }
    }
}
