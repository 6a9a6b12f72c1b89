//! Offset-addressable file window.
//!
//! `FileSource` keeps a bounded, contiguous slice of a file in memory and
//! moves it on request. Only the window is ever resident, so the file can be
//! far larger than memory.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;

/// Buffer capacity used when the caller asks for zero (or a negative) size.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// Positional read access to an immutable byte sequence.
pub trait ByteSource {
    /// Total length in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Read into `buf` starting at `offset`. May return fewer bytes than
    /// requested; `Ok(0)` means end of data.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl ByteSource for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::seek_read(self, buf, offset)
    }
}

impl ByteSource for Mmap {
    fn len(&self) -> io::Result<u64> {
        Ok(self[..].len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = &self[..];
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// How the window buffer is filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Positional reads on the file handle.
    #[default]
    Read,
    /// Copies out of a read-only memory map.
    Mmap,
}

fn open_file(path: &Path) -> Result<File, SourceError> {
    File::open(path).map_err(|e| SourceError::from_open(path.to_path_buf(), e))
}

fn map_file(path: &Path, file: &File) -> Result<Mmap, SourceError> {
    // The mapping is read-only and nothing writes through it.
    unsafe { Mmap::map(file) }.map_err(|e| SourceError::from_open(path.to_path_buf(), e))
}

/// Turn a user-supplied buffer size into a capacity request.
/// Zero and negative values select `DEFAULT_BUFFER_SIZE`.
pub fn normalize_request(requested: i64) -> usize {
    if requested <= 0 {
        DEFAULT_BUFFER_SIZE
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    }
}

/// A sliding window over a byte source.
pub struct FileSource<S: ByteSource = File> {
    path: PathBuf,
    source: Option<S>,
    file_size: u64,
    capacity: usize,
    buffer: Vec<u8>,
    /// Reads land here first so a failed read never clobbers `buffer`.
    scratch: Vec<u8>,
    window_offset: u64,
    valid_length: usize,
    loaded: bool,
    reads: u64,
}

impl FileSource<File> {
    /// Open `path` and load the first window.
    ///
    /// `requested_buffer_size == 0` selects `DEFAULT_BUFFER_SIZE`. The actual
    /// capacity is capped at the file size.
    pub fn open(
        path: impl AsRef<Path>,
        requested_buffer_size: usize,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = open_file(&path)?;
        Self::from_source(path, file, requested_buffer_size)
    }
}

impl FileSource<Mmap> {
    /// Like [`FileSource::open`], but serves reads out of a read-only mapping.
    pub fn open_mmap(
        path: impl AsRef<Path>,
        requested_buffer_size: usize,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = open_file(&path)?;
        let mmap = map_file(&path, &file)?;
        Self::from_source(path, mmap, requested_buffer_size)
    }
}

impl FileSource<Box<dyn ByteSource>> {
    /// Open `path` with the backend picked at runtime.
    pub fn open_with(
        path: impl AsRef<Path>,
        requested_buffer_size: usize,
        backend: Backend,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = open_file(&path)?;
        let empty = file
            .metadata()
            .map(|m| m.len() == 0)
            .map_err(|e| SourceError::from_open(path.clone(), e))?;

        // Empty files can't be mapped on every platform; reads work for all.
        let source: Box<dyn ByteSource> = match backend {
            Backend::Mmap if !empty => Box::new(map_file(&path, &file)?),
            _ => Box::new(file),
        };
        Self::from_source(path, source, requested_buffer_size)
    }
}

impl<S: ByteSource> FileSource<S> {
    /// Wrap an already opened source and load the first window.
    pub fn from_source(
        path: PathBuf,
        source: S,
        requested_buffer_size: usize,
    ) -> Result<Self, SourceError> {
        let file_size = source
            .len()
            .map_err(|e| SourceError::from_open(path.clone(), e))?;

        let requested = if requested_buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            requested_buffer_size
        };
        let capacity = usize::try_from(file_size).map_or(requested, |size| requested.min(size));

        let mut this = Self {
            path,
            source: Some(source),
            file_size,
            capacity,
            buffer: vec![0; capacity],
            scratch: vec![0; capacity],
            window_offset: 0,
            valid_length: 0,
            loaded: false,
            reads: 0,
        };

        if let Err(err) = this.tick(0) {
            let source = match err {
                SourceError::ReadFailed { source, .. } => source,
                other => io::Error::other(other.to_string()),
            };
            return Err(SourceError::Unreadable {
                path: this.path.clone(),
                source,
            });
        }

        tracing::info!(
            path = %this.path.display(),
            file_size,
            capacity,
            "opened file window"
        );
        Ok(this)
    }

    /// Move the window so it covers `desired_offset`, clamped to the file.
    ///
    /// Requests that resolve to the current window do no I/O. On a failed
    /// read the window is left exactly as it was.
    pub fn tick(&mut self, desired_offset: u64) -> Result<(), SourceError> {
        let target = desired_offset.min(self.max_offset());
        if self.loaded && target == self.window_offset {
            return Ok(());
        }

        let Some(source) = self.source.as_ref() else {
            return Ok(());
        };

        let mut filled = 0;
        while filled < self.capacity {
            let at = target + filled as u64;
            self.reads += 1;
            match source.read_at(&mut self.scratch[filled..], at) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SourceError::ReadFailed { offset: at, source: e }),
            }
        }

        std::mem::swap(&mut self.buffer, &mut self.scratch);
        self.window_offset = target;
        self.valid_length = filled;
        self.loaded = true;

        tracing::debug!(
            offset = target,
            valid = filled,
            requested = desired_offset,
            "window moved"
        );
        Ok(())
    }

    /// Release the buffer and the underlying handle. Later calls do nothing.
    pub fn close(&mut self) {
        if self.source.take().is_none() {
            return;
        }
        self.buffer = Vec::new();
        self.scratch = Vec::new();
        self.valid_length = 0;
        tracing::info!(path = %self.path.display(), "closed file window");
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// File offset of `buffer()[0]`.
    pub fn window_offset(&self) -> u64 {
        self.window_offset
    }

    pub fn valid_length(&self) -> usize {
        self.valid_length
    }

    /// The meaningful bytes of the current window.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..self.valid_length]
    }

    /// Largest offset the window can start at.
    pub fn max_offset(&self) -> u64 {
        self.file_size.saturating_sub(self.capacity as u64)
    }

    /// Number of `read_at` calls issued so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }
}
