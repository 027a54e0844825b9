//! ZIP extraction with an eager integrity pass.
//!
//! Extraction runs in two passes over the archive. The first pass resolves
//! every member path through [`resolve_member`] and streams every payload
//! through a CRC-32 check; nothing touches the destination until the whole
//! archive has passed. The second pass materializes the entries, symlinks
//! last.
//!
//! # Platform Behavior
//!
//! **Unix**: stored permission bits are applied to files (owner read/write is
//! always kept) and symlink records become symlinks. **Windows**: permission
//! bits are ignored and symlink records are written as small files holding
//! the target path.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::entry::{ArchiveReport, Entry, EntryKind};
use crate::error::{Error, Result};
use crate::format::{CompressionMethod, is_symlink_mode};
use crate::sanitize::{member_key, resolve_link_target, resolve_member};

/// Longest symlink target accepted, matching Linux `PATH_MAX`.
const MAX_LINK_TARGET_LEN: u64 = 4096;

/// `io::Write` sink that only accumulates a CRC-32.
#[derive(Default)]
pub(crate) struct Crc32Sink(crc32fast::Hasher);

impl Crc32Sink {
    pub(crate) fn finalize(self) -> u32 { self.0.finalize() }
}

impl Write for Crc32Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

struct Planned {
    index:  usize,
    entry:  Entry,
    target: PathBuf,
}

/// Extract `archive` into `destination`, creating it if needed.
///
/// Fails with [`Error::PathEscape`] if any member, or the target of any
/// symlink member, would land outside `destination`, and with [`Error::ChecksumMismatch`] or
/// [`Error::Corrupted`] if any member fails its integrity check. In both
/// cases nothing has been written.
pub fn extract(archive: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<ArchiveReport> {
    let archive = archive.as_ref();
    let destination = destination.as_ref();

    let file = File::open(archive).map_err(|e| Error::ReadFailed {
        path:   archive.to_path_buf(),
        source: e,
    })?;
    let mut zip = open_zip(BufReader::new(file), archive)?;

    let planned = plan_entries(&mut zip, archive, destination)?;

    ensure_directory(destination)?;
    let (links, others): (Vec<&Planned>, Vec<&Planned>) = planned.iter().partition(|p| p.entry.is_symlink());
    for plan in others.into_iter().chain(links) {
        write_entry(&mut zip, archive, plan)?;
        tracing::debug!(entry = %plan.entry.path, "extracted");
    }
    let entries: Vec<Entry> = planned
        .into_iter()
        .map(|plan| plan.entry.with_target_path(plan.target))
        .collect();

    let report = ArchiveReport::from_entries(entries);
    tracing::info!(
        archive = %archive.display(),
        entries = report.entry_count,
        bytes = report.total_bytes,
        "extracted archive"
    );
    Ok(report)
}

pub(crate) fn open_zip<R: Read + Seek>(reader: R, archive: &Path) -> Result<ZipArchive<R>> {
    ZipArchive::new(reader).map_err(|e| Error::Corrupted {
        archive: archive.to_path_buf(),
        detail:  e.to_string(),
    })
}

/// Pass one: guard every path and verify every checksum.
fn plan_entries<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    archive: &Path,
    destination: &Path,
) -> Result<Vec<Planned>> {
    let corrupted = |detail: String| Error::Corrupted {
        archive: archive.to_path_buf(),
        detail,
    };

    let mut planned = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut file = zip
            .by_index(index)
            .map_err(|e| corrupted(format!("entry #{index}: {e}")))?;

        let name = file.name().to_string();
        let sanitized = resolve_member(destination, &name)?;
        let kind = if file.is_dir() {
            EntryKind::Directory
        } else if file.unix_mode().is_some_and(is_symlink_mode) {
            EntryKind::Symlink
        } else {
            EntryKind::File
        };
        if kind != EntryKind::Directory && sanitized.is_root() {
            return Err(Error::InvalidPath {
                entry:  name,
                reason: "file entry has no name",
            });
        }

        let (actual, read, link_target) = if kind == EntryKind::Symlink {
            let mut raw = Vec::new();
            (&mut file)
                .take(MAX_LINK_TARGET_LEN + 1)
                .read_to_end(&mut raw)
                .map_err(|e| corrupted(format!("{name}: {e}")))?;
            if raw.len() as u64 > MAX_LINK_TARGET_LEN {
                return Err(Error::InvalidPath {
                    entry:  name,
                    reason: "symlink target too long",
                });
            }
            let crc = crc32fast::hash(&raw);
            let read = raw.len() as u64;
            let Ok(target) = String::from_utf8(raw) else {
                return Err(Error::InvalidPath {
                    entry:  name,
                    reason: "symlink target is not UTF-8",
                });
            };
            (crc, read, Some(target))
        } else {
            let mut sink = Crc32Sink::default();
            let read = io::copy(&mut file, &mut sink).map_err(|e| corrupted(format!("{name}: {e}")))?;
            (sink.finalize(), read, None)
        };
        if actual != file.crc32() {
            return Err(Error::ChecksumMismatch {
                archive: archive.to_path_buf(),
                entry: name,
                expected: file.crc32(),
                actual,
            });
        }
        if read != file.size() {
            return Err(corrupted(format!("{name}: declared {} bytes, read {read}", file.size())));
        }

        let entry = Entry {
            path: name,
            kind,
            size: file.size(),
            compressed_size: file.compressed_size(),
            crc32: file.crc32(),
            method: CompressionMethod::from(file.compression()),
            flags: None,
            mode: file.unix_mode(),
            link_target,
            target_path: None,
        };
        planned.push(Planned {
            index,
            entry,
            target: sanitized.resolved,
        });
    }

    check_links(&planned, destination)?;
    Ok(planned)
}

/// Every link target must stay below `destination`, also when resolved
/// through the other links of the archive.
fn check_links(planned: &[Planned], destination: &Path) -> Result<()> {
    let mut links = HashMap::new();
    for plan in planned {
        if let Some(target) = &plan.entry.link_target {
            links.insert(member_key(&plan.entry.path)?, target.clone());
        }
    }
    for plan in planned {
        if let Some(target) = &plan.entry.link_target {
            resolve_link_target(destination, &plan.entry.path, target, &links)?;
        }
    }
    Ok(())
}

/// Pass two: materialize one planned entry.
fn write_entry<R: Read + Seek>(zip: &mut ZipArchive<R>, archive: &Path, plan: &Planned) -> Result<()> {
    match plan.entry.kind {
        EntryKind::Directory => ensure_directory(&plan.target),
        EntryKind::File => {
            if let Some(parent) = plan.target.parent() {
                ensure_directory(parent)?;
            }
            let mut source = zip.by_index(plan.index).map_err(|e| Error::Corrupted {
                archive: archive.to_path_buf(),
                detail:  format!("{}: {e}", plan.entry.path),
            })?;
            let mut out = File::create(&plan.target).map_err(|e| Error::ExtractionFailed {
                path:   plan.target.clone(),
                source: e,
            })?;
            io::copy(&mut source, &mut out).map_err(|e| Error::ExtractionFailed {
                path:   plan.target.clone(),
                source: e,
            })?;
            apply_mode(&plan.target, plan.entry.mode)
        }
        EntryKind::Symlink => {
            if let Some(parent) = plan.target.parent() {
                ensure_directory(parent)?;
            }
            let target = plan.entry.link_target.as_deref().unwrap_or_default();
            create_symlink(target, &plan.target).map_err(|e| Error::ExtractionFailed {
                path:   plan.target.clone(),
                source: e,
            })
        }
    }
}

#[cfg(unix)]
fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::fs::write(link, target)
}

fn ensure_directory(path: &Path) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path).map_err(|e| Error::DirectoryCreationFailed {
            path:   path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode.map(|m| m & 0o777).filter(|m| *m != 0) else {
        return Ok(());
    };
    let mode = if mode & 0o111 != 0 { mode | 0o600 } else { mode | 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        Error::ExtractionFailed {
            path:   path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<()> { Ok(()) }
