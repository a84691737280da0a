//! Static HTML report and filtered CSV export.
//!
//! The report is a single self-contained file: styles and charts (inline SVG)
//! are embedded, no scripts or external assets are referenced.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use chrono::{Local, NaiveDateTime};

use crate::color::{generate_palette, to_hex, ColorMap};
use crate::config::SummaryConfig;
use crate::data::filter::{build_mask, FilterSet, RowMask};
use crate::data::model::{format_number, ColumnType, Dataset, Value};
use crate::data::summary::{summarize_all, Chart, ColumnSummary, HistogramBin, NumericStats};

/// Title used when neither a title nor a source file is known.
pub const DEFAULT_TITLE: &str = "CSV Dashboard";

const CHART_WIDTH: f64 = 520.0;
const CHART_HEIGHT: f64 = 220.0;
const MARGIN: f64 = 28.0;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Everything the static report shows, computed once from the dataset.
#[derive(Debug, Clone)]
pub struct Report {
    pub title: String,
    pub generated_at: NaiveDateTime,
    pub total_rows: usize,
    pub filtered_rows: usize,
    pub column_count: usize,
    pub filters: FilterSet,
    /// Criteria that were dropped while building the mask.
    pub warnings: Vec<String>,
    pub summaries: Vec<ColumnSummary>,
}

impl Report {
    /// Apply `filters` and summarise every column over the surviving rows.
    pub fn build(
        title: impl Into<String>,
        dataset: &Dataset,
        filters: &FilterSet,
        config: &SummaryConfig,
    ) -> (Self, RowMask) {
        let outcome = build_mask(dataset, filters);
        let report = Self {
            title: title.into(),
            generated_at: Local::now().naive_local(),
            total_rows: dataset.len(),
            filtered_rows: outcome.mask.count(),
            column_count: dataset.columns().len(),
            filters: filters.clone(),
            warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
            summaries: summarize_all(dataset, &outcome.mask, config),
        };
        (report, outcome.mask)
    }

    fn of_type<'a>(&'a self, kinds: &'a [ColumnType]) -> impl Iterator<Item = &'a ColumnSummary> {
        self.summaries
            .iter()
            .filter(move |s| kinds.contains(&s.column_type))
    }
}

/// The explicit title if one was given, else the source file name.
pub fn report_title(explicit: Option<&str>, source: Option<&Path>) -> String {
    if let Some(title) = explicit {
        return title.to_string();
    }
    source
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// Write the rendered report to `path`.
pub fn export_html(path: &Path, report: &Report) -> anyhow::Result<()> {
    fs::write(path, render_html(report))
        .with_context(|| format!("writing report to {}", path.display()))?;
    log::info!(
        "Exported report '{}' ({} of {} rows) to {}",
        report.title,
        report.filtered_rows,
        report.total_rows,
        path.display()
    );
    Ok(())
}

/// Write the rows selected by `mask` as comma-separated text, header first.
/// Missing cells are empty. Returns the number of data rows written.
pub fn write_filtered_csv<W: Write>(
    dataset: &Dataset,
    mask: &RowMask,
    writer: W,
) -> Result<usize, csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(dataset.column_names())?;

    let mut written = 0;
    for row in mask.selected() {
        out.write_record(dataset.columns().iter().map(|c| c.raw_at(row).unwrap_or("")))?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

// ---------------------------------------------------------------------------
// HTML rendering
// ---------------------------------------------------------------------------

/// Render the full report document.
pub fn render_html(report: &Report) -> String {
    let mut html = String::with_capacity(16 * 1024);
    let title = escape(&report.title);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n"));
    html.push_str(&format!("<h1>{title}</h1>\n"));
    html.push_str(&format!(
        "<p class=\"meta\">Generated {} &middot; {} of {} rows &middot; {} columns</p>\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.filtered_rows,
        report.total_rows,
        report.column_count
    ));

    html.push_str(&render_filters(report));
    html.push_str(&render_tables(report));

    html.push_str("<h2>Charts</h2>\n<div class=\"charts\">\n");
    for summary in &report.summaries {
        if let Some(svg) = render_chart(summary) {
            html.push_str(&format!(
                "<figure><figcaption>{}</figcaption>\n{svg}</figure>\n",
                escape(&summary.column)
            ));
        }
    }
    html.push_str("</div>\n");

    let state = serde_json::to_string_pretty(&report.filters).unwrap_or_else(|e| {
        log::warn!("Could not serialise filter state: {e}");
        "{}".to_string()
    });
    html.push_str(&format!(
        "<script type=\"application/json\" id=\"filter-state\">\n{}\n</script>\n",
        state.replace("</", "<\\/")
    ));
    html.push_str("</body>\n</html>\n");
    html
}

fn render_filters(report: &Report) -> String {
    let mut items: Vec<String> = Vec::new();
    if let Some(query) = report.filters.global_search() {
        items.push(format!("<li>Search: &quot;{}&quot;</li>", escape(query)));
    }
    for (column, criterion) in report.filters.criteria() {
        items.push(format!(
            "<li><b>{}</b>: {}</li>",
            escape(column),
            escape(&criterion.describe())
        ));
    }

    let mut html = String::from("<h2>Filters</h2>\n");
    if items.is_empty() {
        html.push_str("<p>No filters applied.</p>\n");
    } else {
        html.push_str(&format!("<ul>\n{}\n</ul>\n", items.join("\n")));
    }
    if !report.warnings.is_empty() {
        html.push_str("<ul class=\"warnings\">\n");
        for w in &report.warnings {
            html.push_str(&format!("<li>Ignored: {}</li>\n", escape(w)));
        }
        html.push_str("</ul>\n");
    }
    html
}

fn render_tables(report: &Report) -> String {
    let mut html = String::new();

    let numeric: Vec<Vec<String>> = report
        .of_type(&[ColumnType::Numeric])
        .map(|s| {
            let stat = |f: fn(&NumericStats) -> f64| {
                s.numeric.as_ref().map(|n| format_number(f(n))).unwrap_or_default()
            };
            vec![
                s.column.clone(),
                s.stats.count.to_string(),
                format!("{:.1}%", s.stats.missing_pct()),
                stat(|n| n.mean),
                s.numeric
                    .as_ref()
                    .and_then(|n| n.std)
                    .map(format_number)
                    .unwrap_or_default(),
                stat(|n| n.min),
                stat(|n| n.median),
                stat(|n| n.p95),
                stat(|n| n.max),
            ]
        })
        .collect();
    html.push_str(&table(
        "Numeric columns",
        &["Column", "Count", "Missing", "Mean", "Std", "Min", "Median", "P95", "Max"],
        &numeric,
    ));

    let categorical: Vec<Vec<String>> = report
        .of_type(&[ColumnType::Categorical])
        .map(|s| {
            vec![
                s.column.clone(),
                s.stats.count.to_string(),
                s.stats.distinct.to_string(),
                format!("{:.1}%", s.stats.missing_pct()),
                most_common(s),
            ]
        })
        .collect();
    html.push_str(&table(
        "Categorical columns",
        &["Column", "Count", "Distinct", "Missing", "Most common"],
        &categorical,
    ));

    let datetime: Vec<Vec<String>> = report
        .of_type(&[ColumnType::Datetime])
        .map(|s| {
            let (first, last) = s
                .span
                .map(|(a, b)| (Value::DateTime(a).to_string(), Value::DateTime(b).to_string()))
                .unwrap_or_default();
            vec![
                s.column.clone(),
                s.stats.count.to_string(),
                format!("{:.1}%", s.stats.missing_pct()),
                first,
                last,
            ]
        })
        .collect();
    html.push_str(&table(
        "Datetime columns",
        &["Column", "Count", "Missing", "First", "Last"],
        &datetime,
    ));

    let other: Vec<Vec<String>> = report
        .of_type(&[ColumnType::Boolean, ColumnType::Text])
        .map(|s| {
            vec![
                s.column.clone(),
                s.column_type.to_string(),
                s.stats.count.to_string(),
                s.stats.distinct.to_string(),
                format!("{:.1}%", s.stats.missing_pct()),
                most_common(s),
            ]
        })
        .collect();
    html.push_str(&table(
        "Boolean and text columns",
        &["Column", "Type", "Count", "Distinct", "Missing", "Most common"],
        &other,
    ));

    html
}

fn most_common(summary: &ColumnSummary) -> String {
    summary
        .most_common
        .as_ref()
        .map(|(v, n)| format!("{v} ({n})"))
        .unwrap_or_default()
}

/// A captioned table; nothing when there are no rows.
fn table(caption: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let head: String = headers.iter().map(|h| format!("<th>{}</th>", escape(h))).collect();
    let body: String = rows
        .iter()
        .map(|r| {
            let cells: String = r.iter().map(|c| format!("<td>{}</td>", escape(c))).collect();
            format!("<tr>{cells}</tr>\n")
        })
        .collect();
    format!(
        "<h2>{}</h2>\n<table>\n<thead><tr>{head}</tr></thead>\n<tbody>\n{body}</tbody>\n</table>\n",
        escape(caption)
    )
}

// ---------------------------------------------------------------------------
// Inline SVG charts
// ---------------------------------------------------------------------------

fn render_chart(summary: &ColumnSummary) -> Option<String> {
    match &summary.chart {
        Chart::Histogram(bins) if !bins.is_empty() => Some(histogram_svg(bins)),
        Chart::TopN { bars, other } if !bars.is_empty() => Some(bars_svg(bars, *other)),
        Chart::TimeSeries { points, bucket } if !points.is_empty() => {
            let labelled: Vec<(String, usize)> = points
                .iter()
                .map(|(d, n)| (d.format("%Y-%m-%d").to_string(), *n))
                .collect();
            Some(line_svg(&labelled, bucket.label()))
        }
        _ => None,
    }
}

fn svg_open() -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{CHART_WIDTH}\" height=\"{CHART_HEIGHT}\" \
         viewBox=\"0 0 {CHART_WIDTH} {CHART_HEIGHT}\">\n"
    )
}

fn histogram_svg(bins: &[HistogramBin]) -> String {
    let color = generate_palette(1).first().map(|c| to_hex(*c)).unwrap_or_default();
    let max = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1) as f64;
    let plot_w = CHART_WIDTH - 2.0 * MARGIN;
    let plot_h = CHART_HEIGHT - 2.0 * MARGIN;
    let bar_w = plot_w / bins.len() as f64;

    let mut svg = svg_open();
    for (i, bin) in bins.iter().enumerate() {
        let h = bin.count as f64 / max * plot_h;
        svg.push_str(&format!(
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{color}\">\
             <title>{} to {}: {}</title></rect>\n",
            MARGIN + i as f64 * bar_w,
            MARGIN + plot_h - h,
            (bar_w - 1.0).max(1.0),
            h,
            format_number(bin.lower),
            format_number(bin.upper),
            bin.count
        ));
    }
    if let (Some(first), Some(last)) = (bins.first(), bins.last()) {
        svg.push_str(&axis_labels(&format_number(first.lower), &format_number(last.upper)));
    }
    svg.push_str("</svg>\n");
    svg
}

fn bars_svg(bars: &[(String, usize)], other: usize) -> String {
    let mut rows: Vec<(&str, usize)> = bars.iter().map(|(l, n)| (l.as_str(), *n)).collect();
    if other > 0 {
        rows.push(("Other", other));
    }
    let colors = ColorMap::new(rows.iter().map(|(l, _)| *l));
    let max = rows.iter().map(|(_, n)| *n).max().unwrap_or(0).max(1) as f64;
    let label_w = 120.0;
    let plot_w = CHART_WIDTH - label_w - MARGIN;
    let row_h = (CHART_HEIGHT - MARGIN) / rows.len() as f64;

    let mut svg = svg_open();
    for (i, (label, count)) in rows.iter().enumerate() {
        let y = MARGIN / 2.0 + i as f64 * row_h;
        let w = *count as f64 / max * plot_w;
        let short: String = label.chars().take(18).collect();
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>\
             <rect x=\"{label_w:.1}\" y=\"{:.1}\" width=\"{w:.1}\" height=\"{:.1}\" fill=\"{}\">\
             <title>{}: {count}</title></rect>\n",
            label_w - 6.0,
            y + row_h * 0.65,
            escape(&short),
            y + row_h * 0.1,
            row_h * 0.8,
            to_hex(colors.color_for(label)),
            escape(label),
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

fn line_svg(points: &[(String, usize)], bucket: &str) -> String {
    let color = generate_palette(3).get(2).map(|c| to_hex(*c)).unwrap_or_default();
    let max = points.iter().map(|(_, n)| *n).max().unwrap_or(0).max(1) as f64;
    let plot_w = CHART_WIDTH - 2.0 * MARGIN;
    let plot_h = CHART_HEIGHT - 2.0 * MARGIN;
    let step = if points.len() > 1 {
        plot_w / (points.len() - 1) as f64
    } else {
        0.0
    };

    let coords: Vec<String> = points
        .iter()
        .enumerate()
        .map(|(i, (_, n))| {
            format!(
                "{:.1},{:.1}",
                MARGIN + i as f64 * step,
                MARGIN + plot_h - *n as f64 / max * plot_h
            )
        })
        .collect();

    let mut svg = svg_open();
    svg.push_str(&format!(
        "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"2\" points=\"{}\"/>\n",
        coords.join(" ")
    ));
    for ((label, n), xy) in points.iter().zip(&coords) {
        let (x, y) = xy.split_once(',').unwrap_or(("0", "0"));
        svg.push_str(&format!(
            "<circle cx=\"{x}\" cy=\"{y}\" r=\"2.5\" fill=\"{color}\"><title>{} ({bucket}): {n}</title></circle>\n",
            escape(label)
        ));
    }
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        svg.push_str(&axis_labels(&first.0, &last.0));
    }
    svg.push_str("</svg>\n");
    svg
}

fn axis_labels(left: &str, right: &str) -> String {
    let y = CHART_HEIGHT - MARGIN / 3.0;
    format!(
        "<text x=\"{MARGIN}\" y=\"{y:.1}\">{}</text>\
         <text x=\"{:.1}\" y=\"{y:.1}\" text-anchor=\"end\">{}</text>\n",
        escape(left),
        CHART_WIDTH - MARGIN,
        escape(right)
    )
}

/// Escape text for HTML element content and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
h1{margin-bottom:.2rem}.meta{color:#666}\
table{border-collapse:collapse;margin-bottom:1.5rem}\
th,td{border:1px solid #ddd;padding:.3rem .6rem;text-align:right}\
th:first-child,td:first-child{text-align:left}th{background:#f4f4f4}\
.warnings{color:#a33}.charts{display:flex;flex-wrap:wrap;gap:1rem}\
figure{margin:0;border:1px solid #eee;padding:.5rem}figcaption{font-weight:600}\
svg text{font-size:11px;fill:#444}";
