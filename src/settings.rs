use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::palette::{Color, Palette};
use crate::source::{Backend, DEFAULT_BUFFER_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub buffer_size: usize,
    pub palette: Palette,
    pub background: [u8; 3],
    pub window_width: u32,
    pub window_height: u32,
    /// Raster rows scrolled per mouse wheel notch.
    pub wheel_rows: u32,
    pub backend: Backend,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            palette: Palette::Grayscale,
            background: [0, 0, 0],
            window_width: 1024,
            window_height: 768,
            wheel_rows: 3,
            backend: Backend::Read,
        }
    }
}

impl AppSettings {
    pub fn background_color(&self) -> Color {
        let [r, g, b] = self.background;
        Color::rgb(r, g, b)
    }
}

fn settings_dir() -> Option<PathBuf> {
    // On macOS: ~/Library/Application Support/rasterview
    // On Linux: ~/.config/rasterview (via dirs crate)
    dirs::config_dir().map(|d| d.join("rasterview"))
}

pub fn settings_path() -> Option<PathBuf> {
    settings_dir().map(|d| d.join("settings.json"))
}

/// Load settings from the platform config directory.
/// Returns default settings if the file is missing or invalid.
pub fn load_settings() -> AppSettings {
    match settings_path() {
        Some(path) => load_settings_from(&path),
        None => {
            tracing::debug!("settings: cannot determine config path");
            AppSettings::default()
        }
    }
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(_) => {
            tracing::debug!("settings: no settings file at {}", path.display());
            return AppSettings::default();
        }
    };

    match serde_json::from_str(&data) {
        Ok(s) => {
            tracing::info!("settings: loaded from {}", path.display());
            s
        }
        Err(e) => {
            tracing::warn!("settings: failed to parse {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}
