use eframe::egui;

use crate::state::AppState;
use crate::ui::{panels, plot, table};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct DashboardApp {
    pub state: AppState,
}

impl DashboardApp {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: filters ----
        egui::SidePanel::left("filter_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Bottom panel: preview of surviving rows ----
        if self.state.dataset.is_some() {
            egui::TopBottomPanel::bottom("preview_panel")
                .default_height(240.0)
                .resizable(true)
                .show(ctx, |ui| {
                    table::preview_table(ui, &self.state);
                });
        }

        // ---- Central panel: charts ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::summary_charts(ui, &self.state);
        });
    }
}
