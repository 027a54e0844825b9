use std::cell::Cell;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{Error, Result};

const PREFIX: &str = "repack-";

/// Exclusively owned staging tree for one top-level archive.
///
/// Every stage directory handed out lives under a single temporary root that
/// is removed when the `WorkArea` is closed or dropped, on success and
/// failure alike.
pub struct WorkArea {
    root: TempDir,
    next: Cell<usize>,
}

impl WorkArea {
    /// Create a work area under the system temporary directory.
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir()
            .map_err(|e| Error::Create {
                path:   std::env::temp_dir(),
                source: e,
            })?;
        Ok(Self::from_root(root))
    }

    /// Create a work area under `parent`, creating `parent` if needed.
    ///
    /// Useful on hosts where deep extraction trees would otherwise exceed
    /// path-length limits.
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent).map_err(|e| Error::Create {
            path:   parent.to_path_buf(),
            source: e,
        })?;
        let root = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir_in(parent)
            .map_err(|e| Error::Create {
                path:   parent.to_path_buf(),
                source: e,
            })?;
        Ok(Self::from_root(root))
    }

    fn from_root(root: TempDir) -> Self {
        tracing::debug!(path = %root.path().display(), "created work area");
        Self { root, next: Cell::new(0) }
    }

    pub fn path(&self) -> &Path { self.root.path() }

    /// Create a fresh, empty stage directory named after `label`.
    ///
    /// Stage directories are flat siblings under the root, numbered in
    /// allocation order so that names never collide.
    pub fn stage(&self, label: &str) -> Result<PathBuf> {
        let index = self.next.get();
        self.next.set(index + 1);

        let label: String = label
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        let path = self.root.path().join(format!("{index:03}-{label}"));
        std::fs::create_dir(&path).map_err(|e| Error::Create {
            path:   path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Remove the whole tree now, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<()> {
        let path = self.root.path().to_path_buf();
        self.root.close().map_err(|e| Error::Remove { path, source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stage_dirs_are_unique() -> Result<()> {
        let area = WorkArea::new()?;
        let a = area.stage("bundle")?;
        let b = area.stage("bundle")?;
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        assert!(a.starts_with(area.path()));
        Ok(())
    }

    #[test]
    fn test_stage_label_cannot_nest() -> Result<()> {
        let area = WorkArea::new()?;
        let stage = area.stage("../a/b")?;
        assert_eq!(stage.parent(), Some(area.path()));
        Ok(())
    }

    #[test]
    fn test_cleanup_on_drop() -> Result<()> {
        let dir = tempdir().unwrap();
        let root;
        {
            let area = WorkArea::new_in(dir.path())?;
            root = area.path().to_path_buf();
            let stage = area.stage("x")?;
            std::fs::write(stage.join("file.txt"), "data").unwrap();
            assert!(root.exists());
        }
        assert!(!root.exists());
        Ok(())
    }

    #[test]
    fn test_close_removes_tree() -> Result<()> {
        let dir = tempdir().unwrap();
        let area = WorkArea::new_in(dir.path().join("nested/work"))?;
        let root = area.path().to_path_buf();
        area.stage("x")?;
        area.close()?;
        assert!(!root.exists());
        assert!(dir.path().join("nested/work").is_dir());
        Ok(())
    }
}
