use crate::controller::Controller;
use crate::palette::Palette;
use crate::scroll::ScrollState;
use crate::source::ByteSource;
use dear_imgui_rs::*;
use std::path::Path;

/// Snapshot of the view shown in the control panel.
pub struct ViewStatus<'a> {
    pub path: &'a Path,
    pub file_size: u64,
    pub capacity: usize,
    pub window_offset: u64,
    pub valid_length: usize,
    pub max_offset: u64,
    /// Bytes per raster row (the grid width).
    pub row_bytes: u32,
    pub palette: Palette,
    pub last_error: Option<String>,
}

impl<'a> ViewStatus<'a> {
    pub fn of<S: ByteSource>(controller: &'a Controller<S, Palette>) -> Self {
        let source = controller.source();
        Self {
            path: source.path(),
            file_size: source.file_size(),
            capacity: source.capacity(),
            window_offset: source.window_offset(),
            valid_length: source.valid_length(),
            max_offset: source.max_offset(),
            row_bytes: controller.mapper().width(),
            palette: *controller.mapper().policy(),
            last_error: controller.last_error().map(|e| e.to_string()),
        }
    }
}

/// Navigation input collected during one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NavInput {
    pub wheel: f32,
    pub up: bool,
    pub down: bool,
    pub page_up: bool,
    pub page_down: bool,
    pub home: bool,
    pub end: bool,
}

/// Turns wheel notches into whole raster rows. Touchpads report fractions
/// of a notch; the remainder carries over to later frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelRows {
    rows_per_notch: f32,
    carry: f32,
}

impl WheelRows {
    pub fn new(rows_per_notch: u32) -> Self {
        Self {
            rows_per_notch: rows_per_notch as f32,
            carry: 0.0,
        }
    }

    /// Rows to scroll for `notches` of wheel motion. Positive notches
    /// (wheel up) scroll toward the start of the file.
    pub fn take(&mut self, notches: f32) -> i64 {
        self.carry -= notches * self.rows_per_notch;
        let whole = self.carry.trunc();
        self.carry -= whole;
        whole as i64
    }
}

impl NavInput {
    /// Turn this frame's input into scroll requests.
    ///
    /// Arrows move one raster row, the wheel goes through `wheel`, page keys
    /// move one full window.
    pub fn apply(
        &self,
        status: &ViewStatus<'_>,
        wheel: &mut WheelRows,
        scroll: &mut ScrollState,
    ) {
        let row = i64::from(status.row_bytes.max(1));
        let page = i64::try_from(status.capacity.max(1)).unwrap_or(i64::MAX);

        if self.home {
            scroll.seek(0);
        }
        if self.end {
            scroll.seek(status.max_offset);
        }
        if self.wheel != 0.0 {
            let rows = wheel.take(self.wheel);
            if rows != 0 {
                scroll.scroll_by(rows.saturating_mul(row));
            }
        }
        if self.down {
            scroll.scroll_by(row);
        }
        if self.up {
            scroll.scroll_by(-row);
        }
        if self.page_down {
            scroll.scroll_by(page);
        }
        if self.page_up {
            scroll.scroll_by(-page);
        }
    }
}

pub struct ControlPanel {
    wheel: WheelRows,
    palette_names: Vec<String>,
}

impl ControlPanel {
    pub fn new(wheel_rows: u32) -> Self {
        Self {
            wheel: WheelRows::new(wheel_rows),
            palette_names: Palette::ALL.iter().map(|p| p.name().to_string()).collect(),
        }
    }

    /// Draw the panel and feed this frame's input into `scroll`.
    /// Returns the newly selected palette, if the user changed it.
    pub fn render(
        &mut self,
        ui: &Ui,
        status: &ViewStatus<'_>,
        scroll: &mut ScrollState,
    ) -> Option<Palette> {
        let mut selected_palette = None;
        let mut panel_hovered = false;

        ui.window("rasterview")
            .position([10.0, 10.0], Condition::FirstUseEver)
            .size([340.0, 200.0], Condition::FirstUseEver)
            .build(|| {
                panel_hovered = ui.is_window_hovered();

                ui.text(format!("File: {}", status.path.display()));
                ui.text(format!(
                    "Size: {} ({} bytes)",
                    format_size(status.file_size),
                    format_number(status.file_size)
                ));
                ui.text(format!(
                    "Window: {} .. {} ({} of {} bytes)",
                    format_number(status.window_offset),
                    format_number(status.window_offset + status.valid_length as u64),
                    format_number(status.valid_length as u64),
                    format_number(status.capacity as u64)
                ));

                ui.separator();

                let mut offset = status.window_offset;
                ui.set_next_item_width(-1.0);
                if ui.slider("##offset", 0u64, status.max_offset, &mut offset) {
                    scroll.seek(offset);
                }

                let mut palette_idx = Palette::ALL
                    .iter()
                    .position(|p| *p == status.palette)
                    .unwrap_or(0);
                ui.set_next_item_width(150.0);
                if ui.combo_simple_string("Palette", &mut palette_idx, &self.palette_names) {
                    selected_palette = Palette::ALL.get(palette_idx).copied();
                }

                if let Some(err) = &status.last_error {
                    ui.text_colored([1.0, 0.3, 0.3, 1.0], format!("Error: {}", err));
                }

                ui.text_colored(
                    [0.5, 0.5, 0.5, 1.0],
                    "Wheel/arrows: scroll  PgUp/PgDn: page  Home/End: jump",
                );
            });

        let mut input = NavInput {
            up: ui.is_key_pressed(Key::UpArrow),
            down: ui.is_key_pressed(Key::DownArrow),
            page_up: ui.is_key_pressed(Key::PageUp),
            page_down: ui.is_key_pressed(Key::PageDown),
            home: ui.is_key_pressed(Key::Home),
            end: ui.is_key_pressed(Key::End),
            ..NavInput::default()
        };
        if !panel_hovered && !ui.is_any_item_active() {
            input.wheel = ui.io().mouse_wheel();
        }
        input.apply(status, &mut self.wheel, scroll);

        selected_palette.filter(|p| *p != status.palette)
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes = s.as_bytes();
    let mut result = String::new();
    for (i, &b) in bytes.iter().enumerate() {
        if i > 0 && (bytes.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(b as char);
    }
    result
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", format_number(bytes));
    }
    if bytes < 1024 * 1024 {
        return format!("{} KB", format_number(bytes / 1024));
    }
    if bytes < 1024 * 1024 * 1024 {
        return format!("{} MB", format_number(bytes / (1024 * 1024)));
    }
    format!("{} GB", format_number(bytes / (1024 * 1024 * 1024)))
}
