use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use crate::extract::open_zip;
use crate::format::{CompressionMethod, is_symlink_mode};

/// List the central directory of `archive` without extracting anything.
pub fn list_entries(archive: impl AsRef<Path>) -> Result<Vec<Entry>> {
    let archive = archive.as_ref();
    let file = File::open(archive).map_err(|e| Error::ReadFailed {
        path:   archive.to_path_buf(),
        source: e,
    })?;
    let mut zip = open_zip(BufReader::new(file), archive)?;

    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let record = zip.by_index_raw(index).map_err(|e| Error::Corrupted {
            archive: archive.to_path_buf(),
            detail:  format!("entry #{index}: {e}"),
        })?;
        entries.push(Entry {
            path: record.name().to_string(),
            kind: if record.is_dir() {
                EntryKind::Directory
            } else if record.unix_mode().is_some_and(is_symlink_mode) {
                EntryKind::Symlink
            } else {
                EntryKind::File
            },
            size: record.size(),
            compressed_size: record.compressed_size(),
            crc32: record.crc32(),
            method: CompressionMethod::from(record.compression()),
            flags: None,
            mode: record.unix_mode(),
            link_target: None,
            target_path: None,
        });
    }
    Ok(entries)
}
