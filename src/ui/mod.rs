//! egui rendering. Widgets read from and write to [`AppState`](crate::state::AppState);
//! no computation happens here.

pub mod panels;
pub mod plot;
pub mod table;
