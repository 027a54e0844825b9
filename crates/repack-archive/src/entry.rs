use std::path::PathBuf;

use crate::format::{CompressionMethod, FLAG_UTF8};

/// One record of an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Path as stored in the archive, forward-slash separated.
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    pub method: CompressionMethod,
    /// General purpose flags, when the reading path exposes them.
    pub flags: Option<u16>,
    pub mode: Option<u32>,
    /// Link target as stored in the payload, for symlink records.
    pub link_target: Option<String>,
    pub target_path: Option<PathBuf>,
}

impl Entry {
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
            size: 0,
            compressed_size: 0,
            crc32: 0,
            method: CompressionMethod::Stored,
            flags: None,
            mode: None,
            link_target: None,
            target_path: None,
        }
    }

    pub fn with_target_path(mut self, target_path: PathBuf) -> Self {
        self.target_path = Some(target_path);
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, EntryKind::Symlink)
    }

    /// Whether the UTF-8 name flag is set, if the flags are known.
    pub fn has_utf8_flag(&self) -> Option<bool> {
        self.flags.map(|f| f & FLAG_UTF8 != 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Clone, Debug)]
pub struct ArchiveReport {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub entries: Vec<Entry>,
}

impl ArchiveReport {
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self {
            entry_count: entries.len(),
            total_bytes: entries.iter().map(|e| e.size).sum(),
            entries,
        }
    }
}
