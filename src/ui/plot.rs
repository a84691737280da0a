use eframe::egui::{Color32, RichText, ScrollArea, Ui};
use egui_plot::{Bar, BarChart, Line, Plot, PlotPoints, Points};

use crate::color::{generate_palette, ColorMap};
use crate::data::model::{format_number, Value};
use crate::data::summary::{Chart, ColumnSummary};
use crate::state::AppState;

const CHART_HEIGHT: f32 = 180.0;

// ---------------------------------------------------------------------------
// Summary charts (central panel)
// ---------------------------------------------------------------------------

/// Render one card per column: headline stats and its chart.
pub fn summary_charts(ui: &mut Ui, state: &AppState) {
    if state.dataset.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a file to build a dashboard  (File → Open…)");
        });
        return;
    }

    ui.heading(state.title());
    if let Some(info) = state.dataset_info() {
        ui.label(RichText::new(info).color(Color32::GRAY));
    }
    ui.separator();

    if state.mask.count() == 0 {
        ui.label("No rows match the current filters.");
    }

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for summary in &state.summaries {
                ui.group(|ui: &mut Ui| {
                    ui.horizontal(|ui: &mut Ui| {
                        ui.strong(&summary.column);
                        ui.label(RichText::new(summary.column_type.as_str()).italics());
                    });
                    ui.label(stats_line(summary));
                    chart(ui, summary);
                });
                ui.add_space(6.0);
            }
        });
}

/// One-line textual summary shown above each chart.
fn stats_line(summary: &ColumnSummary) -> String {
    let s = &summary.stats;
    let mut parts = vec![
        format!("count {}", s.count),
        format!("distinct {}", s.distinct),
        format!("missing {:.1}%", s.missing_pct()),
    ];
    if let Some(n) = &summary.numeric {
        parts.push(format!("mean {}", format_number(n.mean)));
        if let Some(std) = n.std {
            parts.push(format!("std {}", format_number(std)));
        }
        parts.push(format!(
            "min {} · median {} · p95 {} · max {}",
            format_number(n.min),
            format_number(n.median),
            format_number(n.p95),
            format_number(n.max)
        ));
    }
    if let Some((value, count)) = &summary.most_common {
        parts.push(format!("most common {value} ({count})"));
    }
    if let Some((first, last)) = summary.span {
        parts.push(format!(
            "{} to {}",
            Value::DateTime(first),
            Value::DateTime(last)
        ));
    }
    parts.join("  ·  ")
}

fn chart(ui: &mut Ui, summary: &ColumnSummary) {
    let id = ("chart", summary.column.as_str());
    match &summary.chart {
        Chart::Histogram(bins) if !bins.is_empty() => {
            let color = generate_palette(1).first().copied().unwrap_or(Color32::LIGHT_BLUE);
            let bars: Vec<Bar> = bins
                .iter()
                .map(|b| {
                    let width = match b.upper - b.lower {
                        w if w > 0.0 => w,
                        _ => 1.0,
                    };
                    Bar::new((b.lower + b.upper) / 2.0, b.count as f64)
                        .width(width)
                        .name(format!(
                            "{} to {}",
                            format_number(b.lower),
                            format_number(b.upper)
                        ))
                        .fill(color)
                })
                .collect();
            base_plot(id)
                .x_axis_label(summary.column.as_str())
                .y_axis_label("rows")
                .show(ui, |plot_ui| plot_ui.bar_chart(BarChart::new(bars)));
        }
        Chart::TopN { bars, other } if !bars.is_empty() => {
            let mut labelled: Vec<(&str, usize)> =
                bars.iter().map(|(l, n)| (l.as_str(), *n)).collect();
            if *other > 0 {
                labelled.push(("Other", *other));
            }
            let colors = ColorMap::new(labelled.iter().map(|(l, _)| *l));
            let bars: Vec<Bar> = labelled
                .iter()
                .enumerate()
                .map(|(i, (label, count))| {
                    Bar::new(i as f64, *count as f64)
                        .width(0.8)
                        .name(*label)
                        .fill(colors.color_for(label))
                })
                .collect();
            base_plot(id)
                .y_axis_label("rows")
                .show_x(false)
                .show(ui, |plot_ui| plot_ui.bar_chart(BarChart::new(bars)));
            // Legend under the chart in bar order.
            ui.horizontal_wrapped(|ui: &mut Ui| {
                for (label, count) in &labelled {
                    ui.label(RichText::new(format!("{label} ({count})")).color(colors.color_for(label)));
                }
            });
        }
        Chart::TimeSeries { bucket, points } if !points.is_empty() => {
            let Some(&(origin, _)) = points.first() else {
                return;
            };
            let series: Vec<[f64; 2]> = points
                .iter()
                .map(|(date, n)| [(*date - origin).num_days() as f64, *n as f64])
                .collect();
            let color = generate_palette(3).get(2).copied().unwrap_or(Color32::LIGHT_BLUE);
            base_plot(id)
                .x_axis_label(format!("days since {origin} (per {})", bucket.label()))
                .y_axis_label("rows")
                .show(ui, |plot_ui| {
                    plot_ui.line(
                        Line::new(PlotPoints::from(series.clone()))
                            .color(color)
                            .width(1.5),
                    );
                    plot_ui.points(Points::new(PlotPoints::from(series)).color(color).radius(2.5));
                });
        }
        _ => {}
    }
}

fn base_plot(id: impl std::hash::Hash) -> Plot<'static> {
    Plot::new(id)
        .height(CHART_HEIGHT)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(false)
        .allow_zoom(true)
}
