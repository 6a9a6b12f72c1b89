//! rasterview - scroll through a file's raw bytes rendered as pixels.
//!
//! The core is GUI-free: [`source::FileSource`] keeps a bounded window of the
//! file in memory, [`raster::RasterMapper`] paints that window into a pixel
//! grid, and [`controller::Controller`] ties them together once per frame
//! through the [`controller::OffsetProvider`] and
//! [`controller::RenderSink`] seams. The winit/wgpu/imgui frontend lives in
//! the binary and in [`ui`].

pub mod cli;
pub mod controller;
pub mod error;
pub mod interrupt;
pub mod palette;
pub mod raster;
pub mod scroll;
pub mod settings;
pub mod source;
pub mod ui;

pub use controller::{CancelFlag, Controller, OffsetProvider, RenderSink};
pub use error::{ConfigError, SourceError};
pub use palette::{Color, ColorPolicy, Palette};
pub use raster::{RasterMapper, RenderTarget};
pub use scroll::ScrollState;
pub use source::{Backend, ByteSource, FileSource};
