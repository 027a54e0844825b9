//! ZIP extraction and recompression for archives that must open cleanly on Windows.
//!
//! # Architecture
//!
//! - `sanitize.rs` - Member path resolution (zip-slip prevention)
//! - `extract.rs` - Two-pass extraction with CRC verification
//! - `compress.rs` - Deterministic directory compression
//! - `writer.rs` - Record-level ZIP writer (UTF-8 flag on every entry)
//! - `read.rs` - Central directory listing
//! - `format.rs` - Signatures, flags and little-endian helpers

pub use compress::{archive_name, compress};
pub use entry::{ArchiveReport, Entry, EntryKind};
pub use error::{Error, Result};
pub use extract::extract;
pub use read::list_entries;
pub use sanitize::{SanitizedPath, resolve_member};
pub use writer::ArchiveWriter;

pub mod format;
mod compress;
mod entry;
mod error;
mod extract;
mod read;
mod sanitize;
mod writer;
