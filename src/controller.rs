//! Per-frame orchestration: offset in, pixels out.
//!
//! Each frame asks an [`OffsetProvider`] where to look, moves the file
//! window, redraws the raster for the sink's viewport and presents it.
//! Frames run on the caller's thread; the only blocking work is the bounded
//! window read, and it only happens when the window actually moves.

use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SourceError;
use crate::palette::{ColorPolicy, Palette};
use crate::raster::{RasterMapper, RenderTarget};
use crate::source::{ByteSource, FileSource};

/// Set to request shutdown. Checked once per frame boundary.
pub type CancelFlag = Arc<AtomicBool>;

/// Supplies the offset each frame should show.
pub trait OffsetProvider {
    /// `resolved` is where the window landed last frame; return it unchanged
    /// when there was no scroll input.
    fn desired_offset(&mut self, resolved: u64) -> u64;
}

/// Receives finished grids.
pub trait RenderSink {
    /// Current drawable size in pixels.
    fn viewport(&self) -> (u32, u32);

    fn present(&mut self, target: RenderTarget<'_>);
}

pub struct Controller<S: ByteSource = File, P: ColorPolicy = Palette> {
    source: FileSource<S>,
    mapper: RasterMapper<P>,
    last_error: Option<SourceError>,
    /// Offset whose read failed; retried until it loads or input moves on.
    retry: Option<u64>,
    frames: u64,
}

impl<S: ByteSource, P: ColorPolicy> Controller<S, P> {
    pub fn new(source: FileSource<S>, mapper: RasterMapper<P>) -> Self {
        Self {
            source,
            mapper,
            last_error: None,
            retry: None,
            frames: 0,
        }
    }

    /// Run one frame.
    ///
    /// A failed window read is kept in [`last_error`] and the frame draws
    /// from the last good window. The failed offset stays the resolved
    /// offset, so idle frames retry it; the error clears once a read lands
    /// or the input settles on the loaded window.
    ///
    /// [`last_error`]: Controller::last_error
    pub fn frame(&mut self, provider: &mut impl OffsetProvider, sink: &mut impl RenderSink) {
        let resolved = self.retry.unwrap_or(self.source.window_offset());
        let desired = provider.desired_offset(resolved);

        let reads = self.source.reads();
        match self.source.tick(desired) {
            Ok(()) => {
                if self.retry.take().is_some() || self.source.reads() != reads {
                    self.last_error = None;
                }
            }
            Err(err) => {
                if self.last_error.is_none() {
                    tracing::warn!(desired, "window read failed, keeping last window: {err}");
                } else {
                    tracing::debug!(desired, "window read still failing: {err}");
                }
                self.retry = Some(desired);
                self.last_error = Some(err);
            }
        }

        let (width, height) = sink.viewport();
        if (width, height) != (self.mapper.width(), self.mapper.height()) {
            self.mapper.resize(width, height);
        }

        self.mapper
            .draw(self.source.buffer(), self.source.valid_length());
        sink.present(self.mapper.render_target());
        self.frames += 1;
    }

    /// Drive frames until `cancel` is set, then close the file.
    pub fn run(
        &mut self,
        provider: &mut impl OffsetProvider,
        sink: &mut impl RenderSink,
        cancel: &CancelFlag,
    ) {
        while !cancel.load(Ordering::Relaxed) {
            self.frame(provider, sink);
        }
        tracing::info!(frames = self.frames, "interrupt received, shutting down");
        self.shutdown();
    }

    /// Close the file window. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.source.close();
    }

    pub fn source(&self) -> &FileSource<S> {
        &self.source
    }

    pub fn mapper(&self) -> &RasterMapper<P> {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut RasterMapper<P> {
        &mut self.mapper
    }

    pub fn last_error(&self) -> Option<&SourceError> {
        self.last_error.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::Color;
    use crate::scroll::ScrollState;
    use std::cell::Cell;
    use std::io::{self, Write};
    use std::rc::Rc;

    struct FakeSink {
        viewport: (u32, u32),
        presented: Vec<(u32, u32, Vec<u8>)>,
    }

    impl FakeSink {
        fn new(width: u32, height: u32) -> Self {
            Self {
                viewport: (width, height),
                presented: Vec::new(),
            }
        }

        fn last(&self) -> &(u32, u32, Vec<u8>) {
            self.presented.last().unwrap()
        }
    }

    impl RenderSink for FakeSink {
        fn viewport(&self) -> (u32, u32) {
            self.viewport
        }

        fn present(&mut self, target: RenderTarget<'_>) {
            self.presented
                .push((target.width, target.height, target.as_bytes().to_vec()));
        }
    }

    /// Stops the loop after a fixed number of offset requests.
    struct Scripted {
        offsets: Vec<u64>,
        cancel: CancelFlag,
        seen: Vec<u64>,
    }

    impl OffsetProvider for Scripted {
        fn desired_offset(&mut self, resolved: u64) -> u64 {
            self.seen.push(resolved);
            let next = if self.offsets.is_empty() {
                resolved
            } else {
                self.offsets.remove(0)
            };
            if self.offsets.is_empty() {
                self.cancel.store(true, Ordering::Relaxed);
            }
            next
        }
    }

    fn controller_for(data: &[u8], capacity: usize) -> (tempfile::NamedTempFile, Controller) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        let source = FileSource::open(file.path(), capacity).unwrap();
        let mapper = RasterMapper::new(4, 2, Palette::Grayscale).unwrap();
        (file, Controller::new(source, mapper))
    }

    fn gray_bytes(values: &[u8]) -> Vec<u8> {
        values.iter().flat_map(|&v| [v, v, v, 255]).collect()
    }

    #[test]
    fn test_frame_draws_current_window() {
        let data: Vec<u8> = (0..10).collect();
        let (_file, mut controller) = controller_for(&data, 4);
        let mut scroll = ScrollState::new();
        let mut sink = FakeSink::new(4, 2);

        controller.frame(&mut scroll, &mut sink);
        let mut expected = gray_bytes(&[0, 1, 2, 3]);
        expected.extend(gray_bytes(&[0; 4]));
        assert_eq!(sink.last().2, expected);

        scroll.seek(100);
        controller.frame(&mut scroll, &mut sink);
        assert_eq!(controller.source().window_offset(), 6);
        assert_eq!(&sink.last().2[..16], &gray_bytes(&[6, 7, 8, 9])[..]);
    }

    #[test]
    fn test_idle_frames_do_not_read() {
        let data = vec![1u8; 64];
        let (_file, mut controller) = controller_for(&data, 8);
        let mut scroll = ScrollState::new();
        let mut sink = FakeSink::new(4, 2);

        scroll.scroll_by(16);
        controller.frame(&mut scroll, &mut sink);
        let reads = controller.source().reads();
        for _ in 0..5 {
            controller.frame(&mut scroll, &mut sink);
        }
        assert_eq!(controller.source().reads(), reads);
        assert_eq!(controller.source().window_offset(), 16);
        assert_eq!(controller.frames(), 6);
    }

    #[test]
    fn test_viewport_change_resizes_grid() {
        let data: Vec<u8> = (0..32).collect();
        let (_file, mut controller) = controller_for(&data, 32);
        let mut scroll = ScrollState::new();
        let mut sink = FakeSink::new(4, 2);
        controller.frame(&mut scroll, &mut sink);

        sink.viewport = (8, 8);
        controller.frame(&mut scroll, &mut sink);
        let (w, h, bytes) = sink.last();
        assert_eq!((*w, *h), (8, 8));
        assert_eq!(bytes.len(), 8 * 8 * 4);
        // Bytes 32.. of the grid are padding
        assert_eq!(&bytes[32 * 4..32 * 4 + 4], &Color::BLACK.0);

        // A minimized window keeps the previous grid
        sink.viewport = (0, 0);
        controller.frame(&mut scroll, &mut sink);
        assert_eq!((sink.last().0, sink.last().1), (8, 8));
    }

    struct Flaky {
        data: Vec<u8>,
        fail: Rc<Cell<bool>>,
    }

    impl ByteSource for Flaky {
        fn len(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            if self.fail.get() {
                return Err(io::Error::other("boom"));
            }
            let start = (offset as usize).min(self.data.len());
            let n = buf.len().min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            Ok(n)
        }
    }

    fn flaky_controller(len: u8, capacity: usize) -> (Rc<Cell<bool>>, Controller<Flaky>) {
        let fail = Rc::new(Cell::new(false));
        let inner = Flaky {
            data: (0..len).collect(),
            fail: fail.clone(),
        };
        let source = FileSource::from_source("flaky".into(), inner, capacity).unwrap();
        let mapper = RasterMapper::new(4, 2, Palette::Grayscale).unwrap();
        (fail, Controller::new(source, mapper))
    }

    #[test]
    fn test_read_error_persists_and_seek_is_retried() {
        let (fail, mut controller) = flaky_controller(64, 8);
        let mut scroll = ScrollState::new();
        let mut sink = FakeSink::new(4, 2);

        fail.set(true);
        scroll.seek(32);
        controller.frame(&mut scroll, &mut sink);
        assert!(matches!(
            controller.last_error(),
            Some(SourceError::ReadFailed { offset: 32, .. })
        ));
        assert_eq!(controller.source().window_offset(), 0);
        assert_eq!(&sink.last().2[..16], &gray_bytes(&[0, 1, 2, 3])[..]);

        // Idle frames while the disk is still failing keep the error
        controller.frame(&mut scroll, &mut sink);
        controller.frame(&mut scroll, &mut sink);
        assert!(controller.last_error().is_some());
        assert_eq!(controller.source().window_offset(), 0);

        // Once reads work again the pending seek lands
        fail.set(false);
        controller.frame(&mut scroll, &mut sink);
        assert!(controller.last_error().is_none());
        assert_eq!(controller.source().window_offset(), 32);
        assert_eq!(&sink.last().2[..16], &gray_bytes(&[32, 33, 34, 35])[..]);
    }

    #[test]
    fn test_scrolling_back_to_loaded_window_clears_error() {
        let (fail, mut controller) = flaky_controller(64, 8);
        let mut scroll = ScrollState::new();
        let mut sink = FakeSink::new(4, 2);

        fail.set(true);
        scroll.scroll_by(16);
        controller.frame(&mut scroll, &mut sink);
        assert!(controller.last_error().is_some());

        // Relative input applies to the failed target
        scroll.scroll_by(-16);
        controller.frame(&mut scroll, &mut sink);
        assert!(controller.last_error().is_none());
        assert_eq!(controller.source().window_offset(), 0);
    }

    #[test]
    fn test_run_until_cancelled_then_closes() {
        let data: Vec<u8> = (0..100).collect();
        let (_file, mut controller) = controller_for(&data, 10);
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        let mut provider = Scripted {
            offsets: vec![5, 50, 500],
            cancel: cancel.clone(),
            seen: Vec::new(),
        };
        let mut sink = FakeSink::new(4, 2);

        controller.run(&mut provider, &mut sink, &cancel);

        assert_eq!(sink.presented.len(), 3);
        assert_eq!(provider.seen, vec![0, 5, 50]);
        assert_eq!(controller.source().window_offset(), 90);
        assert!(controller.source().is_closed());

        controller.shutdown();
        assert!(controller.source().is_closed());
    }

    #[test]
    fn test_run_with_preset_flag_does_nothing() {
        let (_file, mut controller) = controller_for(b"abc", 4);
        let cancel: CancelFlag = Arc::new(AtomicBool::new(true));
        let mut sink = FakeSink::new(2, 2);
        controller.run(&mut ScrollState::new(), &mut sink, &cancel);
        assert!(sink.presented.is_empty());
        assert!(controller.source().is_closed());
    }
}
