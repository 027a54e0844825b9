use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

use repack_fs::{AtomicFile, AtomicWriteOptions};
use walkdir::WalkDir;

use crate::entry::{ArchiveReport, EntryKind};
use crate::error::{Error, Result};
use crate::writer::ArchiveWriter;

struct Item {
    name: String,
    path: PathBuf,
    kind: EntryKind,
    mode: Option<u32>,
    link_target: Option<String>,
}

/// Compress `source_dir` into `output`, naming entries relative to `base_dir`.
///
/// Entries are sorted by their normalized name so identical trees produce
/// identical bytes. Files, empty directories and symlinks are recorded;
/// symlinks are stored as links, never followed. Other file types are
/// skipped with a warning. `output` only appears once the archive is complete.
pub fn compress(
    source_dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
    base_dir: impl AsRef<Path>,
) -> Result<ArchiveReport> {
    let source_dir = source_dir.as_ref();
    let output = output.as_ref();
    let base_dir = base_dir.as_ref();

    let items = collect(source_dir, base_dir, output)?;

    let write_failed = |e: std::io::Error| Error::Write {
        path:   output.to_path_buf(),
        source: e,
    };
    let sink_error = |e: Error| match e {
        Error::Io(io) => write_failed(io),
        other => other,
    };

    let mut file = AtomicFile::create(output, AtomicWriteOptions::new())?;
    let mut writer = ArchiveWriter::new(BufWriter::new(&mut file));
    for item in &items {
        match item.kind {
            EntryKind::Directory => writer.add_directory(&item.name, item.mode).map_err(sink_error)?,
            EntryKind::File => {
                let data = std::fs::read(&item.path).map_err(|e| Error::ReadFailed {
                    path:   item.path.clone(),
                    source: e,
                })?;
                writer.add_file(&item.name, &data, item.mode).map_err(sink_error)?;
            }
            EntryKind::Symlink => {
                let target = item.link_target.as_deref().unwrap_or_default();
                writer.add_symlink(&item.name, target).map_err(sink_error)?;
            }
        }
        tracing::debug!(entry = %item.name, "compressed");
    }
    let (buffer, entries) = writer.finish().map_err(sink_error)?;
    buffer.into_inner().map_err(|e| write_failed(e.into_error()))?;
    file.commit()?;

    let report = ArchiveReport::from_entries(entries);
    tracing::info!(
        output = %output.display(),
        entries = report.entry_count,
        bytes = report.total_bytes,
        "compressed archive"
    );
    Ok(report)
}

fn collect(source_dir: &Path, base_dir: &Path, output: &Path) -> Result<Vec<Item>> {
    let output = std::path::absolute(output)?;
    let mut items = Vec::new();

    for entry in WalkDir::new(source_dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| Error::Walk {
            path:   source_dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if std::path::absolute(path)? == output {
            continue;
        }

        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            let mut children = std::fs::read_dir(path).map_err(|e| Error::ReadFailed {
                path:   path.to_path_buf(),
                source: e,
            })?;
            if children.next().is_some() {
                continue;
            }
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else {
            tracing::warn!(path = %path.display(), "skipping entry that is neither file, directory nor symlink");
            continue;
        };

        let link_target = if kind == EntryKind::Symlink {
            let target = std::fs::read_link(path).map_err(|e| Error::ReadFailed {
                path:   path.to_path_buf(),
                source: e,
            })?;
            let target = target.to_str().ok_or_else(|| Error::InvalidPath {
                entry:  path.to_string_lossy().into_owned(),
                reason: "symlink target is not valid UTF-8",
            })?;
            Some(target.replace(std::path::MAIN_SEPARATOR, "/"))
        } else {
            None
        };

        let mut name = archive_name(path, base_dir)?;
        if kind == EntryKind::Directory {
            name.push('/');
        }
        let mode = entry.metadata().ok().and_then(|m| unix_mode(&m));
        items.push(Item {
            name,
            path: path.to_path_buf(),
            kind,
            mode,
            link_target,
        });
    }

    items.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    Ok(items)
}

/// Forward-slash name of `path` relative to `base`, whatever the host separator.
pub fn archive_name(path: &Path, base: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| Error::NotUnderBase {
        path: path.to_path_buf(),
        base: base.to_path_buf(),
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| Error::InvalidPath {
                    entry:  relative.to_string_lossy().into_owned(),
                    reason: "name is not valid UTF-8",
                })?;
                segments.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath {
                    entry:  relative.to_string_lossy().into_owned(),
                    reason: "unexpected path component",
                });
            }
        }
    }

    if segments.is_empty() {
        return Err(Error::InvalidPath {
            entry:  relative.to_string_lossy().into_owned(),
            reason: "empty archive name",
        });
    }
    Ok(segments.join("/"))
}

#[cfg(unix)]
fn unix_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &std::fs::Metadata) -> Option<u32> { None }
