use std::collections::BTreeMap;

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.65, 0.5);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0).round() as u8,
                (rgb.green * 255.0).round() as u8,
                (rgb.blue * 255.0).round() as u8,
            )
        })
        .collect()
}

/// CSS hex notation (`#rrggbb`) for the static report.
pub fn to_hex(color: Color32) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
}

// ---------------------------------------------------------------------------
// Color mapping: category label → Color32
// ---------------------------------------------------------------------------

/// Assigns each category label of a chart a stable, distinct colour.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<String, Color32>,
    default_color: Color32,
}

impl ColorMap {
    /// Colours follow the order labels are given in.
    pub fn new<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let labels: Vec<&str> = labels.into_iter().collect();
        let palette = generate_palette(labels.len());
        let mapping = labels
            .into_iter()
            .zip(palette)
            .map(|(label, c)| (label.to_string(), c))
            .collect();

        ColorMap {
            mapping,
            default_color: Color32::GRAY,
        }
    }

    /// Look up the colour for a label; unknown labels are grey.
    pub fn color_for(&self, label: &str) -> Color32 {
        self.mapping
            .get(label)
            .copied()
            .unwrap_or(self.default_color)
    }
}
