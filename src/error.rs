use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the file window.
///
/// `NotFound` and `Unreadable` only come out of `FileSource::open` and are
/// fatal at startup. `ReadFailed` comes out of `tick` and leaves the window
/// untouched.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed at offset {offset}: {source}")]
    ReadFailed {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// Classify an error raised while opening or sizing `path`.
    pub(crate) fn from_open(path: PathBuf, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            SourceError::NotFound { path }
        } else {
            SourceError::Unreadable { path, source: err }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid viewport {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    #[error("path is {len} bytes, longer than the {max} byte limit")]
    PathTooLong { len: usize, max: usize },
}
