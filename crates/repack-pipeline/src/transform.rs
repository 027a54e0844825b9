//! Actions applied to the extracted contents of leaf archives.

use std::path::{Component, Path};

use repack_fs::{AtomicWriteOptions, atomic_write};

pub const DEFAULT_MARKER_NAME: &str = "署名済み.txt";
pub const DEFAULT_MARKER_CONTENT: &str = "このフレームワークは署名済みです\n";

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid marker name '{0}': must be a single file name")]
    InvalidMarkerName(String),

    #[error("leaf root '{0}' is not a directory")]
    NotADirectory(std::path::PathBuf),

    #[error(transparent)]
    Fs(#[from] repack_fs::Error),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Core trait for leaf transformations.
///
/// A transform runs against the extraction root of a leaf archive, after
/// extraction and before recompression. Applying it twice must leave the
/// same tree as applying it once.
pub trait Transform: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn apply(&self, leaf: &Path) -> Result<(), TransformError>;
}

/// Write a fixed file with fixed content at the leaf root.
#[derive(Clone, Debug)]
pub struct MarkerTransform {
    file_name: String,
    content:   Vec<u8>,
}

impl Default for MarkerTransform {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_MARKER_NAME.to_string(),
            content:   DEFAULT_MARKER_CONTENT.as_bytes().to_vec(),
        }
    }
}

impl MarkerTransform {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<Self, TransformError> {
        let file_name = file_name.into();
        let mut components = Path::new(&file_name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single || file_name.contains(['/', '\\']) {
            return Err(TransformError::InvalidMarkerName(file_name));
        }
        Ok(Self {
            file_name,
            content: content.into(),
        })
    }

    pub fn file_name(&self) -> &str { &self.file_name }
}

impl Transform for MarkerTransform {
    fn name(&self) -> &str { "marker" }

    fn apply(&self, leaf: &Path) -> Result<(), TransformError> {
        if !leaf.is_dir() {
            return Err(TransformError::NotADirectory(leaf.to_path_buf()));
        }
        let target = leaf.join(&self.file_name);
        atomic_write(&target, &self.content, AtomicWriteOptions::new())?;
        tracing::debug!(path = %target.display(), "wrote marker");
        Ok(())
    }
}
