//! Byte window to pixel grid.
//!
//! One byte fills one cell and one cell is one pixel, in row-major order.
//! The grid is rebuilt from scratch on every draw.

use crate::error::ConfigError;
use crate::palette::{Color, ColorPolicy, Palette};

pub struct RasterMapper<P: ColorPolicy = Palette> {
    width: u32,
    height: u32,
    cells: Vec<[u8; 4]>,
    policy: P,
    /// Colors for all 256 byte values, rebuilt when the policy changes.
    lut: Box<[[u8; 4]; 256]>,
    background: Color,
}

fn capacity(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    (width as usize).checked_mul(height as usize)
}

fn build_lut<P: ColorPolicy>(policy: &P) -> Box<[[u8; 4]; 256]> {
    let mut lut = Box::new([[0u8; 4]; 256]);
    for (byte, slot) in lut.iter_mut().enumerate() {
        *slot = policy.color(byte as u8).0;
    }
    lut
}

impl<P: ColorPolicy> RasterMapper<P> {
    /// Create a grid for a `width` x `height` viewport, filled with black.
    pub fn new(width: u32, height: u32, policy: P) -> Result<Self, ConfigError> {
        let cap = capacity(width, height).ok_or(ConfigError::InvalidViewport { width, height })?;
        let lut = build_lut(&policy);
        Ok(Self {
            width,
            height,
            cells: vec![Color::BLACK.0; cap],
            policy,
            lut,
            background: Color::BLACK,
        })
    }

    /// Use `background` for cells past the end of the byte window.
    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self.cells.fill(background.0);
        self
    }

    /// Reallocate for a new viewport. Zero-sized viewports (a minimized
    /// window, say) are ignored and the old grid is kept.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Some(cap) = capacity(width, height) else {
            tracing::debug!(width, height, "ignoring resize to invalid viewport");
            return;
        };
        self.width = width;
        self.height = height;
        self.cells = vec![self.background.0; cap];
    }

    /// Repaint the whole grid from the first `valid_length` bytes of `buffer`.
    pub fn draw(&mut self, buffer: &[u8], valid_length: usize) {
        let n = valid_length.min(buffer.len()).min(self.cells.len());
        let (painted, padding) = self.cells.split_at_mut(n);
        for (cell, &byte) in painted.iter_mut().zip(buffer) {
            *cell = self.lut[byte as usize];
        }
        padding.fill(self.background.0);
    }

    pub fn set_policy(&mut self, policy: P) {
        self.lut = build_lut(&policy);
        self.policy = policy;
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn grid_capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn background(&self) -> Color {
        self.background
    }

    /// Borrow the current grid for presentation.
    pub fn render_target(&self) -> RenderTarget<'_> {
        RenderTarget {
            width: self.width,
            height: self.height,
            cells: &self.cells,
        }
    }
}

/// Read-only view of a drawn grid. Valid until the next `draw` or `resize`.
#[derive(Clone, Copy)]
pub struct RenderTarget<'a> {
    pub width: u32,
    pub height: u32,
    cells: &'a [[u8; 4]],
}

impl<'a> RenderTarget<'a> {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<Color> {
        self.cells.get(index).copied().map(Color)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cell(y as usize * self.width as usize + x as usize)
    }

    /// Tightly packed RGBA8 rows, `width * 4` bytes each.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.cells.as_flattened()
    }

    /// Same layout as [`as_bytes`](Self::as_bytes) with red and blue
    /// swapped, for BGRA8 surfaces. `out` is reused across frames.
    pub fn bgra_into(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.cells.len() * 4);
        for &[r, g, b, a] in self.cells {
            out.extend_from_slice(&[b, g, r, a]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_invalid_viewport_rejected() {
        assert_eq!(
            RasterMapper::new(0, 10, Palette::Grayscale).err(),
            Some(ConfigError::InvalidViewport { width: 0, height: 10 })
        );
        assert!(RasterMapper::new(10, 0, Palette::Grayscale).is_err());
    }

    #[test]
    fn test_new_grid_is_background() {
        let mapper = RasterMapper::new(4, 3, Palette::Grayscale)
            .unwrap()
            .with_background(Color::rgb(10, 20, 30));
        let target = mapper.render_target();
        assert_eq!(target.len(), 12);
        assert!((0..12).all(|i| target.cell(i) == Some(Color::rgb(10, 20, 30))));
    }

    #[test]
    fn test_draw_pads_with_background() {
        let bg = Color::rgb(0, 0, 80);
        let mut mapper = RasterMapper::new(3, 2, Palette::Grayscale)
            .unwrap()
            .with_background(bg);
        mapper.draw(&[10, 20, 30, 40], 2);

        let target = mapper.render_target();
        assert_eq!(target.cell(0), Some(Color::gray(10)));
        assert_eq!(target.cell(1), Some(Color::gray(20)));
        for i in 2..6 {
            assert_eq!(target.cell(i), Some(bg));
        }
    }

    #[test]
    fn test_draw_truncates_to_grid() {
        let mut mapper = RasterMapper::new(2, 2, Palette::Grayscale).unwrap();
        let bytes: Vec<u8> = (100..110).collect();
        mapper.draw(&bytes, bytes.len());
        let target = mapper.render_target();
        assert_eq!(target.len(), 4);
        assert_eq!(target.pixel(1, 1), Some(Color::gray(103)));
        assert_eq!(target.pixel(2, 0), None);
    }

    #[test]
    fn test_valid_length_beyond_buffer_is_clamped() {
        let mut mapper = RasterMapper::new(4, 1, Palette::Grayscale).unwrap();
        mapper.draw(&[1, 2], 50);
        let target = mapper.render_target();
        assert_eq!(target.cell(1), Some(Color::gray(2)));
        assert_eq!(target.cell(2), Some(Color::BLACK));
    }

    #[test]
    fn test_row_major_layout() {
        let mut mapper = RasterMapper::new(3, 2, Palette::Grayscale).unwrap();
        mapper.draw(&[0, 1, 2, 3, 4, 5], 6);
        let target = mapper.render_target();
        assert_eq!(target.pixel(0, 1), Some(Color::gray(3)));
        assert_eq!(target.pixel(2, 1), Some(Color::gray(5)));
        assert_eq!(&target.as_bytes()[12..16], &[3, 3, 3, 255]);
    }

    #[test]
    fn test_bgra_swaps_red_and_blue() {
        let mut mapper = RasterMapper::new(2, 1, Palette::Thermal)
            .unwrap()
            .with_background(Color::rgb(1, 2, 3));
        mapper.draw(&[85], 1);

        let mut out = vec![9; 3];
        mapper.render_target().bgra_into(&mut out);
        // Thermal red, then the padded background
        assert_eq!(out, [0, 0, 255, 255, 3, 2, 1, 255]);
        assert_eq!(&mapper.render_target().as_bytes()[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_resize_discards_and_ignores_invalid() {
        let mut mapper = RasterMapper::new(2, 2, Palette::Grayscale).unwrap();
        mapper.draw(&[9; 4], 4);

        mapper.resize(3, 3);
        assert_eq!(mapper.grid_capacity(), 9);
        assert_eq!(mapper.render_target().cell(0), Some(Color::BLACK));

        mapper.resize(0, 3);
        assert_eq!((mapper.width(), mapper.height()), (3, 3));
        assert_eq!(mapper.grid_capacity(), 9);
    }

    #[test]
    fn test_policy_switch() {
        let mut mapper = RasterMapper::new(1, 1, Palette::Grayscale).unwrap();
        mapper.set_policy(Palette::Thermal);
        mapper.draw(&[255], 1);
        assert_eq!(mapper.render_target().cell(0), Some(Color::rgb(255, 255, 255)));
        assert_eq!(*mapper.policy(), Palette::Thermal);
    }

    proptest! {
        #[test]
        fn prop_draw_is_deterministic_and_padded(
            bytes in proptest::collection::vec(any::<u8>(), 0..80),
            len in 0usize..100,
            w in 1u32..12,
            h in 1u32..8,
        ) {
            let mut a = RasterMapper::new(w, h, Palette::Thermal).unwrap();
            let mut b = RasterMapper::new(w, h, Palette::Thermal).unwrap();
            a.draw(&bytes, len);
            b.draw(&bytes, len);
            prop_assert_eq!(a.render_target().as_bytes(), b.render_target().as_bytes());

            // Drawing again over a dirty grid gives the same result
            a.draw(&bytes, len);
            prop_assert_eq!(a.render_target().as_bytes(), b.render_target().as_bytes());

            let painted = len.min(bytes.len()).min(a.grid_capacity());
            let target = a.render_target();
            for i in 0..painted {
                prop_assert_eq!(target.cell(i), Some(Palette::Thermal.color(bytes[i])));
            }
            for i in painted..target.len() {
                prop_assert_eq!(target.cell(i), Some(a.background()));
            }
        }
    }
}
