mod atomic;
mod error;
mod workarea;

pub use atomic::{AtomicFile, AtomicWriteOptions, atomic_write};
pub use error::{Error, Result};
pub use workarea::WorkArea;

use std::path::Path;

/// Recursively remove a directory tree.
pub fn remove_tree(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::remove_dir_all(path).map_err(|e| Error::Remove {
        path:   path.to_path_buf(),
        source: e,
    })
}
