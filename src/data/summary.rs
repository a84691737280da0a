use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::SummaryConfig;

use super::filter::RowMask;
use super::model::{ColumnType, Dataset, TypedColumn, Value};

// ---------------------------------------------------------------------------
// Summary selection
// ---------------------------------------------------------------------------

/// The aggregate/chart representation chosen for a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SummaryKind {
    Histogram,
    TopNBarChart,
    TimeSeries,
    /// Count, distinct count and missing count only.
    StatsOnly,
}

pub fn select_summary(column_type: ColumnType) -> SummaryKind {
    match column_type {
        ColumnType::Numeric => SummaryKind::Histogram,
        ColumnType::Categorical => SummaryKind::TopNBarChart,
        ColumnType::Datetime => SummaryKind::TimeSeries,
        ColumnType::Boolean | ColumnType::Text => SummaryKind::StatsOnly,
    }
}

/// Grouping granularity of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeBucket {
    Day,
    Week,
    Month,
}

impl TimeBucket {
    /// Pick the natural bucket for a span of `days`.
    pub fn for_span(days: i64, config: &SummaryConfig) -> Self {
        if days <= config.daily_max_span_days {
            TimeBucket::Day
        } else if days <= config.weekly_max_span_days {
            TimeBucket::Week
        } else {
            TimeBucket::Month
        }
    }

    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn start_of(self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeBucket::Day => date,
            TimeBucket::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            TimeBucket::Month => date.with_day(1).unwrap_or(date),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeBucket::Day => "day",
            TimeBucket::Week => "week",
            TimeBucket::Month => "month",
        }
    }
}

// ---------------------------------------------------------------------------
// Summary data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Chart {
    Histogram(Vec<HistogramBin>),
    TopN {
        bars: Vec<(String, usize)>,
        /// Rows whose value fell outside the top K.
        other: usize,
    },
    TimeSeries {
        bucket: TimeBucket,
        points: Vec<(NaiveDate, usize)>,
    },
    None,
}

/// Counts over the filtered rows of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BasicStats {
    /// Filtered rows considered.
    pub rows: usize,
    /// Non-missing values.
    pub count: usize,
    pub distinct: usize,
    pub missing: usize,
}

impl BasicStats {
    pub fn missing_pct(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.missing as f64 / self.rows as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub mean: f64,
    /// Sample standard deviation; needs at least two values.
    pub std: Option<f64>,
    pub min: f64,
    pub median: f64,
    pub p95: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub column_type: ColumnType,
    pub kind: SummaryKind,
    pub stats: BasicStats,
    pub numeric: Option<NumericStats>,
    pub most_common: Option<(String, usize)>,
    pub span: Option<(NaiveDateTime, NaiveDateTime)>,
    pub chart: Chart,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Summarise one column over the rows selected by `mask`.
pub fn summarize(column: &TypedColumn, mask: &RowMask, config: &SummaryConfig) -> ColumnSummary {
    let selected: Vec<&Value> = mask
        .selected()
        .filter_map(|row| column.values.get(row))
        .collect();
    let present: Vec<&Value> = selected.iter().copied().filter(|v| !v.is_missing()).collect();

    let stats = BasicStats {
        rows: selected.len(),
        count: present.len(),
        distinct: present.iter().collect::<BTreeSet<_>>().len(),
        missing: selected.len() - present.len(),
    };

    let kind = select_summary(column.kind);
    let mut summary = ColumnSummary {
        column: column.name.clone(),
        column_type: column.kind,
        kind,
        stats,
        numeric: None,
        most_common: None,
        span: None,
        chart: Chart::None,
    };

    match kind {
        SummaryKind::Histogram => {
            let mut numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
            numbers.sort_by(f64::total_cmp);
            summary.numeric = numeric_stats(&numbers);
            summary.chart = Chart::Histogram(histogram(&numbers, config.histogram_bins));
        }
        SummaryKind::TopNBarChart => {
            let (bars, other) = top_n(&present, config.top_k);
            summary.most_common = bars.first().cloned();
            summary.chart = Chart::TopN { bars, other };
        }
        SummaryKind::TimeSeries => {
            let stamps: Vec<NaiveDateTime> =
                present.iter().filter_map(|v| v.as_datetime()).collect();
            if let (Some(first), Some(last)) = (stamps.iter().min(), stamps.iter().max()) {
                summary.span = Some((*first, *last));
                let bucket = TimeBucket::for_span((*last - *first).num_days(), config);
                summary.chart = Chart::TimeSeries {
                    bucket,
                    points: time_series(&stamps, bucket),
                };
            }
        }
        SummaryKind::StatsOnly => {
            let (bars, _) = top_n(&present, 1);
            summary.most_common = bars.into_iter().next();
        }
    }
    summary
}

/// Summaries for every column, in column order.
pub fn summarize_all(dataset: &Dataset, mask: &RowMask, config: &SummaryConfig) -> Vec<ColumnSummary> {
    dataset
        .columns()
        .iter()
        .map(|c| summarize(c, mask, config))
        .collect()
}

fn numeric_stats(sorted: &[f64]) -> Option<NumericStats> {
    let (&min, &max) = (sorted.first()?, sorted.last()?);
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std = (sorted.len() > 1).then(|| {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    });
    Some(NumericStats {
        mean,
        std,
        min,
        median: quantile(sorted, 0.5),
        p95: quantile(sorted, 0.95),
        max,
    })
}

/// Linear-interpolated quantile of a sorted, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Equal-width buckets spanning the observed range.
fn histogram(sorted: &[f64], bins: usize) -> Vec<HistogramBin> {
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    if min == max {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: sorted.len(),
        }];
    }

    let bins = bins.max(1);
    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();
    for v in sorted {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

/// The `k` most frequent values (ties broken by value) and the remainder.
fn top_n(values: &[&Value], k: usize) -> (Vec<(String, usize)>, usize) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v.to_string()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    // BTreeMap order already sorts by value; a stable sort keeps it for ties.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let other = ranked.iter().skip(k).map(|(_, c)| c).sum();
    ranked.truncate(k);
    (ranked, other)
}

fn time_series(stamps: &[NaiveDateTime], bucket: TimeBucket) -> Vec<(NaiveDate, usize)> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for ts in stamps {
        *counts.entry(bucket.start_of(ts.date())).or_insert(0) += 1;
    }
    counts.into_iter().collect()
}
