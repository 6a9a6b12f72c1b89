//! Command line surface.
//!
//! Parsing never touches the file system or the display; it only decides
//! whether to run and with what.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::builder::{OsStringValueParser, TypedValueParser};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser};

use crate::error::ConfigError;
use crate::palette::Palette;
use crate::source::normalize_request;

pub const WINDOW_PREFIX: &str = "rasterview";

/// Longest accepted input path, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Parser)]
#[command(
    name = "rasterview",
    about = "Scroll through the raw bytes of a file rendered as pixels",
    disable_version_flag = true,
    args_override_self = true
)]
pub struct Cli {
    /// Input file
    #[arg(
        short,
        long,
        value_name = "PATH",
        value_parser = OsStringValueParser::new().map(PathBuf::from)
    )]
    pub file: Option<PathBuf>,

    /// Buffer size in bytes; zero or negative selects the default
    #[arg(
        short,
        long,
        value_name = "BYTES",
        allow_negative_numbers = true,
        value_parser = parse_size
    )]
    pub size: Option<i64>,

    /// Color palette
    #[arg(short, long, value_enum)]
    pub palette: Option<Palette>,
}

/// Leading optional sign and digits; anything unparsable reads as 0, which
/// later selects the default size.
fn parse_size(raw: &str) -> Result<i64, String> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return Ok(0);
    }
    let value = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Ok(if negative { -value } else { value })
}

/// An input path with an enforced maximum length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPath(PathBuf);

impl InputPath {
    pub fn new(path: PathBuf) -> Result<Self, ConfigError> {
        let len = path.as_os_str().len();
        if len > MAX_PATH_LEN {
            return Err(ConfigError::PathTooLong {
                len,
                max: MAX_PATH_LEN,
            });
        }
        Ok(Self(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn window_title(&self) -> String {
        format!("[{}] - {}", WINDOW_PREFIX, self.0.display())
    }
}

/// Validated launch options. `None` fields fall back to settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub path: InputPath,
    pub buffer_size: Option<usize>,
    pub palette: Option<Palette>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CliAction {
    Run(Launch),
    Exit(u8),
}

fn is_missing_value(err: &clap::Error) -> bool {
    err.kind() == ErrorKind::InvalidValue
        && matches!(
            err.get(ContextKind::InvalidValue),
            Some(ContextValue::String(value)) if value.is_empty()
        )
}

pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

/// Parse `args` (including the program name). Help and diagnostics are
/// printed here; the caller only has to honor the returned action.
pub fn parse_args<I, T>(args: I) -> CliAction
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            return match err.kind() {
                ErrorKind::DisplayHelp => {
                    print!("{}", usage());
                    CliAction::Exit(EXIT_SUCCESS)
                }
                // Unknown options and options missing their value fall
                // through to the usage text, same as -h.
                _ if err.kind() == ErrorKind::UnknownArgument || is_missing_value(&err) => {
                    eprint!("{err}");
                    print!("{}", usage());
                    CliAction::Exit(EXIT_SUCCESS)
                }
                _ => {
                    eprintln!("{err}");
                    CliAction::Exit(EXIT_FAILURE)
                }
            };
        }
    };

    let Some(file) = cli.file.filter(|f| !f.as_os_str().is_empty()) else {
        eprintln!("error: no input file provided");
        eprint!("{}", usage());
        return CliAction::Exit(EXIT_FAILURE);
    };

    let path = match InputPath::new(file) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("error: {err}");
            return CliAction::Exit(EXIT_FAILURE);
        }
    };

    CliAction::Run(Launch {
        path,
        buffer_size: cli.size.map(normalize_request),
        palette: cli.palette,
    })
}
