use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{Error, Result};

#[cfg(unix)]
const DEFAULT_PERMISSIONS: u32 = 0o644;

#[cfg(not(unix))]
const DEFAULT_PERMISSIONS: u32 = 0;

#[derive(Clone, Copy, Debug)]
pub struct AtomicWriteOptions {
    permissions: u32,
    sync:        bool,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self { Self::new() }
}

impl AtomicWriteOptions {
    pub fn new() -> Self {
        Self {
            permissions: DEFAULT_PERMISSIONS,
            sync:        true,
        }
    }

    #[cfg(unix)]
    pub fn permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    #[cfg(not(unix))]
    pub fn permissions(self, _permissions: u32) -> Self { self }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// A file that only appears at its target path once [`AtomicFile::commit`] succeeds.
///
/// Content is written to a hidden temporary sibling of the target. Dropping
/// the value without committing removes the temporary file, so an interrupted
/// or failed write never leaves a partial file at the target path.
pub struct AtomicFile {
    target:  PathBuf,
    temp:    NamedTempFile,
    options: AtomicWriteOptions,
}

impl AtomicFile {
    pub fn create(path: impl AsRef<Path>, options: AtomicWriteOptions) -> Result<Self> {
        let target = path.as_ref().to_path_buf();
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".repack-")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| Error::Create { path: parent.clone(), source: e })?;

        Ok(Self { target, temp, options })
    }

    pub fn target(&self) -> &Path { &self.target }

    pub fn as_file_mut(&mut self) -> &mut File { self.temp.as_file_mut() }

    /// Flush, apply permissions and rename the temporary file over the target.
    pub fn commit(self) -> Result<()> {
        let Self { target, temp, options } = self;
        let temp_path = temp.path().to_path_buf();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(options.permissions))
                .map_err(|e| Error::Write { path: temp_path.clone(), source: e })?;
        }

        if options.sync {
            temp.as_file()
                .sync_all()
                .map_err(|e| Error::Write { path: temp_path.clone(), source: e })?;
        }

        // On failure the PersistError still owns the temp file and removes it on drop.
        temp.persist(&target).map_err(|e| Error::Write {
            path:   target.clone(),
            source: e.error,
        })?;

        tracing::debug!(path = %target.display(), "committed atomic write");
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.temp.write(buf) }

    fn flush(&mut self) -> io::Result<()> { self.temp.flush() }
}

/// Write `content` to `path` atomically.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8], options: AtomicWriteOptions) -> Result<()> {
    let mut file = AtomicFile::create(path, options)?;
    file.write_all(content).map_err(|e| Error::Write {
        path:   file.target().to_path_buf(),
        source: e,
    })?;
    file.commit()
}
