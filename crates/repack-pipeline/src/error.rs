use std::io;
use std::path::PathBuf;

use crate::transform::TransformError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] repack_archive::Error),

    #[error("expected '{expected}' under '{dir}', found: [{}]", .found.join(", "))]
    SchemaMismatch {
        dir:      PathBuf,
        expected: String,
        found:    Vec<String>,
    },

    #[error("transform '{name}' failed: {source}")]
    Transform { name: String, source: TransformError },

    #[error("work area: {0}")]
    WorkArea(#[from] repack_fs::Error),

    #[error("I/O error on '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("output '{0}' would overwrite the input")]
    OutputIsInput(PathBuf),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern { pattern: String, source: glob::PatternError },

    #[error("invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: &'static str },
}

impl PipelineError {
    /// Whether an archive in the tree failed its integrity or path check.
    pub fn is_corrupt_input(&self) -> bool {
        matches!(self, Self::Archive(e) if e.is_corrupt() || matches!(e, repack_archive::Error::PathEscape { .. }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config '{path}': {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("invalid schema in '{path}': {source}")]
    Schema { path: PathBuf, source: PipelineError },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
