use eframe::egui::{Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use crate::state::AppState;

const ROW_HEIGHT: f32 = 18.0;

/// Render the first `max_preview_rows` surviving rows.
pub fn preview_table(ui: &mut Ui, state: &AppState) {
    let Some(dataset) = &state.dataset else {
        return;
    };

    let rows: Vec<usize> = state
        .mask
        .selected()
        .take(state.config.max_preview_rows)
        .collect();
    ui.label(
        RichText::new(format!(
            "Preview: {} of {} filtered rows",
            rows.len(),
            state.mask.count()
        ))
        .color(Color32::GRAY),
    );

    let columns = dataset.columns();
    ScrollArea::horizontal().show(ui, |ui: &mut Ui| {
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .columns(Column::auto().at_least(60.0).clip(true), columns.len())
            .header(ROW_HEIGHT + 2.0, |mut header| {
                for col in columns {
                    header.col(|ui: &mut Ui| {
                        ui.strong(&col.name).on_hover_text(col.kind.as_str());
                    });
                }
            })
            .body(|body| {
                body.rows(ROW_HEIGHT, rows.len(), |mut row| {
                    let source_row = rows[row.index()];
                    for col in columns {
                        row.col(|ui: &mut Ui| match col.raw_at(source_row) {
                            Some(value) => {
                                ui.label(value);
                            }
                            None => {
                                ui.label(RichText::new("missing").italics().color(Color32::GRAY));
                            }
                        });
                    }
                });
            });
    });
}
