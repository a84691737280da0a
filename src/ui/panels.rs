use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::DatePickerButton;

use crate::data::controls::{Checklist, FilterControl};
use crate::data::filter::FilterCriterion;
use crate::data::model::format_number;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – filter widgets
// ---------------------------------------------------------------------------

/// Render the left filter panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Filters");
    ui.separator();

    if state.dataset.is_none() {
        ui.label("No dataset loaded.");
        return;
    }

    ui.horizontal(|ui: &mut Ui| {
        let search = ui.add(
            egui::TextEdit::singleline(&mut state.global_search_input)
                .hint_text("Search text columns"),
        );
        if search.changed() {
            let query = state.global_search_input.clone();
            state.set_global_search(&query);
        }
        if ui.button("Reset").clicked() {
            state.reset_filters();
        }
    });

    for warning in &state.warnings {
        ui.label(RichText::new(warning).color(Color32::RED).small());
    }
    ui.separator();

    // Clone what we need so we can mutate state inside the loop.
    let controls = state.controls.clone();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for (col, control) in &controls {
                let active = state.filters.get(col).is_some();
                let header = if active {
                    RichText::new(format!("{col} (filtered)")).strong()
                } else {
                    RichText::new(col).strong()
                };

                egui::CollapsingHeader::new(header)
                    .id_salt(col)
                    .default_open(false)
                    .show(ui, |ui: &mut Ui| match control {
                        FilterControl::Range { min, max } => range_widget(ui, state, col, *min, *max),
                        FilterControl::DateRange { start, end } => {
                            date_widget(ui, state, col, *start, *end)
                        }
                        FilterControl::MultiSelect(checklist) => {
                            multi_select_widget(ui, state, col, checklist)
                        }
                        FilterControl::Search => search_widget(ui, state, col),
                    });
            }
        });
}

fn range_widget(ui: &mut Ui, state: &mut AppState, col: &str, min: f64, max: f64) {
    let (mut lo, mut hi) = match state.filters.get(col) {
        Some(FilterCriterion::NumericRange { min, max }) => (*min, *max),
        _ => (min, max),
    };

    let changed_lo = ui.add(egui::Slider::new(&mut lo, min..=max).text("min")).changed();
    let changed_hi = ui.add(egui::Slider::new(&mut hi, min..=max).text("max")).changed();
    ui.label(format!("{} to {}", format_number(lo), format_number(hi)));

    if changed_lo || changed_hi {
        if changed_lo {
            hi = hi.max(lo);
        } else {
            lo = lo.min(hi);
        }
        // The full span would drop rows with a missing value.
        let criterion =
            (lo > min || hi < max).then_some(FilterCriterion::NumericRange { min: lo, max: hi });
        state.set_criterion(col, criterion);
    }
}

fn date_widget(
    ui: &mut Ui,
    state: &mut AppState,
    col: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) {
    let (current_start, current_end) = match state.filters.get(col) {
        Some(FilterCriterion::DateRange { start, end }) => (*start, *end),
        _ => (start, end),
    };
    let mut from: NaiveDate = current_start.date();
    let mut to: NaiveDate = current_end.date();

    let mut changed = false;
    ui.horizontal(|ui: &mut Ui| {
        ui.label("from");
        changed |= ui
            .add(DatePickerButton::new(&mut from).id_salt(&format!("{col}_from")))
            .changed();
    });
    ui.horizontal(|ui: &mut Ui| {
        ui.label("to");
        changed |= ui
            .add(DatePickerButton::new(&mut to).id_salt(&format!("{col}_to")))
            .changed();
    });

    if changed {
        if to < from {
            to = from;
        }
        let criterion = (from > start.date() || to < end.date()).then(|| FilterCriterion::DateRange {
            start: from.and_time(NaiveTime::MIN),
            end: end_of_day(to),
        });
        state.set_criterion(col, criterion);
    }
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

fn multi_select_widget(ui: &mut Ui, state: &mut AppState, col: &str, checklist: &Checklist) {
    // Select all / none buttons
    ui.horizontal(|ui: &mut Ui| {
        if ui.small_button("All").clicked() {
            state.set_criterion(col, None);
        }
        if ui.small_button("None").clicked() {
            state.set_criterion(
                col,
                Some(FilterCriterion::CategoricalSelection {
                    values: Default::default(),
                    all: false,
                }),
            );
        }
    });

    let selected = checklist.selected(state.filters.get(col));
    for choice in &checklist.choices {
        let mut checked = selected.contains(choice);
        if ui.checkbox(&mut checked, choice).changed() {
            let criterion = checklist.toggle(state.filters.get(col), choice, checked);
            state.set_criterion(col, criterion);
        }
    }

    let unlisted = checklist.unlisted();
    if unlisted > 0 {
        ui.label(
            RichText::new(format!("{unlisted} less frequent value(s) not listed"))
                .small()
                .color(Color32::GRAY),
        );
    }
}

fn search_widget(ui: &mut Ui, state: &mut AppState, col: &str) {
    let buffer = state.search_inputs.entry(col.to_string()).or_default();
    if ui
        .add(egui::TextEdit::singleline(buffer).hint_text("contains…"))
        .changed()
    {
        let query = buffer.clone();
        let criterion =
            (!query.trim().is_empty()).then_some(FilterCriterion::TextSearch { query });
        state.set_criterion(col, criterion);
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            let has_data = state.dataset.is_some();
            if ui.add_enabled(has_data, egui::Button::new("Export report…")).clicked() {
                export_report_dialog(state);
                ui.close_menu();
            }
            if ui
                .add_enabled(has_data, egui::Button::new("Save filtered CSV…"))
                .clicked()
            {
                save_csv_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(info) = state.dataset_info() {
            ui.label(info);
        }

        if !state.warnings.is_empty() {
            ui.separator();
            ui.label(
                RichText::new(format!("{} filter(s) ignored", state.warnings.len()))
                    .color(Color32::from_rgb(200, 120, 0)),
            );
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            let color = if msg.starts_with("Error") {
                Color32::RED
            } else {
                Color32::GRAY
            };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open tabular data")
        .add_filter(
            "Supported files",
            &["csv", "tsv", "txt", "gz", "xlsx", "xlsm", "xlsb", "xls", "ods", "parquet", "pq"],
        )
        .add_filter("Delimited text", &["csv", "tsv", "txt", "gz"])
        .add_filter("Spreadsheets", &["xlsx", "xlsm", "xlsb", "xls", "ods"])
        .add_filter("Parquet", &["parquet", "pq"])
        .pick_file();

    if let Some(path) = file {
        // Errors are logged and shown in the status line by `load_path`.
        let _ = state.load_path(&path);
    }
}

fn export_report_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Export report")
        .add_filter("HTML", &["html"])
        .set_file_name("report.html")
        .save_file();

    if let Some(path) = file {
        state.status_message = Some(match state.export_report(&path) {
            Ok(()) => format!("Report written to {}", path.display()),
            Err(e) => {
                log::error!("Failed to export report: {e:#}");
                format!("Error: {e:#}")
            }
        });
    }
}

fn save_csv_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Save filtered CSV")
        .add_filter("CSV", &["csv"])
        .set_file_name("filtered.csv")
        .save_file();

    if let Some(path) = file {
        state.status_message = Some(match state.save_filtered_csv(&path) {
            Ok(rows) => format!("{rows} rows saved to {}", path.display()),
            Err(e) => {
                log::error!("Failed to save CSV: {e:#}");
                format!("Error: {e:#}")
            }
        });
    }
}
