use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("path escape detected: entry '{entry}' resolves to '{resolved}'")]
    PathEscape { entry: String, resolved: PathBuf },

    #[error("invalid entry path '{entry}': {reason}")]
    InvalidPath { entry: String, reason: &'static str },

    #[error("archive '{archive}' is corrupted: {detail}")]
    Corrupted { archive: PathBuf, detail: String },

    #[error("checksum mismatch in '{archive}' for '{entry}': stored {expected:08x}, computed {actual:08x}")]
    ChecksumMismatch {
        archive:  PathBuf,
        entry:    String,
        expected: u32,
        actual:   u32,
    },

    #[error("failed to write '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read '{path}': {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error("failed to extract '{path}': {source}")]
    ExtractionFailed { path: PathBuf, source: io::Error },

    #[error("failed to create directory: {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("failed to walk '{path}': {source}")]
    Walk { path: PathBuf, source: walkdir::Error },

    #[error("'{path}' is not under base directory '{base}'")]
    NotUnderBase { path: PathBuf, base: PathBuf },

    #[error("archive exceeds classic ZIP limits: {0}")]
    TooLarge(&'static str),

    #[error(transparent)]
    Fs(#[from] repack_fs::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the archive itself failed its integrity check.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::ChecksumMismatch { .. })
    }

    /// Whether an output could not be written.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Fs(_) | Self::TooLarge(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
