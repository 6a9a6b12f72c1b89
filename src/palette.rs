//! Byte-to-color policies.
//!
//! Every policy is a pure function of the byte value and is monotonic in
//! intensity, so brighter cells always mean larger bytes.

use serde::{Deserialize, Serialize};

/// An RGBA8 pixel. Layout matches what the GPU texture upload expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color([r, g, b, 255])
    }

    pub const fn gray(v: u8) -> Self {
        Color::rgb(v, v, v)
    }

    /// Perceived brightness (Rec. 601 luma weights, integer math).
    pub fn intensity(self) -> u32 {
        let [r, g, b, _] = self.0;
        299 * r as u32 + 587 * g as u32 + 114 * b as u32
    }
}

/// Maps one byte value to one cell color.
pub trait ColorPolicy {
    fn color(&self, byte: u8) -> Color;
}

impl<F: Fn(u8) -> Color> ColorPolicy for F {
    fn color(&self, byte: u8) -> Color {
        self(byte)
    }
}

/// Built-in palettes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    /// Byte value is the gray level.
    #[default]
    Grayscale,
    /// Black through red and yellow to white.
    Thermal,
}

impl Palette {
    pub const ALL: [Palette; 2] = [Palette::Grayscale, Palette::Thermal];

    pub fn name(self) -> &'static str {
        match self {
            Palette::Grayscale => "Grayscale",
            Palette::Thermal => "Thermal",
        }
    }
}

impl ColorPolicy for Palette {
    fn color(&self, byte: u8) -> Color {
        match self {
            Palette::Grayscale => Color::gray(byte),
            Palette::Thermal => thermal(byte),
        }
    }
}

/// Three linear legs: red rises over 0..=85, green over 85..=170, blue over
/// 170..=255. Each leg only raises a channel, so luma never drops.
fn thermal(byte: u8) -> Color {
    let v = byte as u32;
    let ramp = |lo: u32| -> u8 {
        let t = v.saturating_sub(lo).min(85);
        (t * 255 / 85) as u8
    };
    Color::rgb(ramp(0), ramp(85), ramp(170))
}
