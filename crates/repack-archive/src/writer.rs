use std::io::{self, Write};

use flate2::Compression;
use flate2::write::DeflateEncoder;

use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use crate::format::{
    CENTRAL_DIRECTORY_SIGNATURE, CompressionMethod, DOS_ATTR_DIRECTORY, DOS_EPOCH_DATE,
    DOS_EPOCH_TIME, END_OF_CENTRAL_DIRECTORY_SIGNATURE, FLAG_UTF8, LOCAL_FILE_HEADER_SIGNATURE,
    S_IFDIR, S_IFLNK, S_IFREG, VERSION_MADE_BY_UNIX, VERSION_NEEDED_DEFLATE, VERSION_NEEDED_STORED,
};

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

struct CentralRecord {
    name:            Vec<u8>,
    version_needed:  u16,
    flags:           u16,
    method:          u16,
    crc32:           u32,
    compressed_size: u32,
    size:            u32,
    external_attrs:  u32,
    local_offset:    u32,
}

/// Sequential ZIP writer producing records a Windows reader decodes without guessing.
///
/// Every record carries the UTF-8 name flag, a fixed DOS timestamp and sizes in
/// the local header (no data descriptors). File payloads are Deflate
/// compressed; directory records are empty and stored; symlink records store
/// the link target as their payload. Names are written
/// verbatim: callers are responsible for normalizing them.
pub struct ArchiveWriter<W: Write> {
    inner:   W,
    offset:  u64,
    records: Vec<CentralRecord>,
    entries: Vec<Entry>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offset: 0,
            records: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Append a file record. `mode` holds Unix permission bits.
    pub fn add_file(&mut self, name: &str, data: &[u8], mode: Option<u32>) -> Result<()> {
        let crc32 = crc32fast::hash(data);
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        let mode = S_IFREG | (mode.unwrap_or(DEFAULT_FILE_MODE) & 0o7777);
        self.push(name, EntryKind::File, CompressionMethod::Deflated, crc32, data.len(), &compressed, mode)
    }

    /// Append a directory record; a trailing `/` is added when missing.
    pub fn add_directory(&mut self, name: &str, mode: Option<u32>) -> Result<()> {
        let name = if name.ends_with('/') { name.to_string() } else { format!("{name}/") };
        let mode = S_IFDIR | (mode.unwrap_or(DEFAULT_DIR_MODE) & 0o7777);
        self.push(&name, EntryKind::Directory, CompressionMethod::Stored, 0, 0, &[], mode)
    }

    /// Append a symlink record whose payload is `target`, the way Info-ZIP
    /// stores links (mode `S_IFLNK | 0777` in the external attributes).
    pub fn add_symlink(&mut self, name: &str, target: &str) -> Result<()> {
        let payload = target.as_bytes();
        let crc32 = crc32fast::hash(payload);
        self.push(name, EntryKind::Symlink, CompressionMethod::Stored, crc32, payload.len(), payload, S_IFLNK | 0o777)?;
        if let Some(entry) = self.entries.last_mut() {
            entry.link_target = Some(target.to_string());
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        name: &str,
        kind: EntryKind,
        method: CompressionMethod,
        crc32: u32,
        size: usize,
        payload: &[u8],
        unix_mode: u32,
    ) -> Result<()> {
        if self.records.len() >= u16::MAX as usize {
            return Err(Error::TooLarge("more than 65534 entries"));
        }
        let name_len = u16::try_from(name.len()).map_err(|_| Error::TooLarge("entry name longer than 65535 bytes"))?;
        let size = u32::try_from(size).map_err(|_| Error::TooLarge("entry larger than 4 GiB"))?;
        let compressed_size =
            u32::try_from(payload.len()).map_err(|_| Error::TooLarge("compressed entry larger than 4 GiB"))?;
        let local_offset = u32::try_from(self.offset).map_err(|_| Error::TooLarge("archive larger than 4 GiB"))?;

        let version_needed = match method {
            CompressionMethod::Deflated => VERSION_NEEDED_DEFLATE,
            _ => VERSION_NEEDED_STORED,
        };
        let flags = FLAG_UTF8;

        let mut header = Vec::with_capacity(30 + name.len());
        header.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE);
        header.extend_from_slice(&version_needed.to_le_bytes());
        header.extend_from_slice(&flags.to_le_bytes());
        header.extend_from_slice(&method.as_u16().to_le_bytes());
        header.extend_from_slice(&DOS_EPOCH_TIME.to_le_bytes());
        header.extend_from_slice(&DOS_EPOCH_DATE.to_le_bytes());
        header.extend_from_slice(&crc32.to_le_bytes());
        header.extend_from_slice(&compressed_size.to_le_bytes());
        header.extend_from_slice(&size.to_le_bytes());
        header.extend_from_slice(&name_len.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(name.as_bytes());

        self.write(&header)?;
        self.write(payload)?;

        let dos_attrs = if kind == EntryKind::Directory { DOS_ATTR_DIRECTORY } else { 0 };
        self.records.push(CentralRecord {
            name: name.as_bytes().to_vec(),
            version_needed,
            flags,
            method: method.as_u16(),
            crc32,
            compressed_size,
            size,
            external_attrs: (unix_mode << 16) | dos_attrs,
            local_offset,
        });

        self.entries.push(Entry {
            path: name.to_string(),
            kind,
            size: u64::from(size),
            compressed_size: u64::from(compressed_size),
            crc32,
            method,
            flags: Some(flags),
            mode: Some(unix_mode & 0o7777),
            link_target: None,
            target_path: None,
        });
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Write the central directory and end record, returning the sink and the
    /// entries in archive order.
    pub fn finish(mut self) -> Result<(W, Vec<Entry>)> {
        let cd_offset = u32::try_from(self.offset).map_err(|_| Error::TooLarge("archive larger than 4 GiB"))?;

        let records = std::mem::take(&mut self.records);
        for record in &records {
            let mut header = Vec::with_capacity(46 + record.name.len());
            header.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE);
            header.extend_from_slice(&VERSION_MADE_BY_UNIX.to_le_bytes());
            header.extend_from_slice(&record.version_needed.to_le_bytes());
            header.extend_from_slice(&record.flags.to_le_bytes());
            header.extend_from_slice(&record.method.to_le_bytes());
            header.extend_from_slice(&DOS_EPOCH_TIME.to_le_bytes());
            header.extend_from_slice(&DOS_EPOCH_DATE.to_le_bytes());
            header.extend_from_slice(&record.crc32.to_le_bytes());
            header.extend_from_slice(&record.compressed_size.to_le_bytes());
            header.extend_from_slice(&record.size.to_le_bytes());
            header.extend_from_slice(&(record.name.len() as u16).to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes()); // extra
            header.extend_from_slice(&0u16.to_le_bytes()); // comment
            header.extend_from_slice(&0u16.to_le_bytes()); // disk start
            header.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            header.extend_from_slice(&record.external_attrs.to_le_bytes());
            header.extend_from_slice(&record.local_offset.to_le_bytes());
            header.extend_from_slice(&record.name);
            self.write(&header)?;
        }

        let cd_size = u32::try_from(self.offset - u64::from(cd_offset))
            .map_err(|_| Error::TooLarge("central directory larger than 4 GiB"))?;
        if self.offset > u64::from(u32::MAX) {
            return Err(Error::TooLarge("archive larger than 4 GiB"));
        }
        let count = records.len() as u16;

        let mut end = Vec::with_capacity(22);
        end.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        end.extend_from_slice(&0u16.to_le_bytes());
        end.extend_from_slice(&0u16.to_le_bytes());
        end.extend_from_slice(&count.to_le_bytes());
        end.extend_from_slice(&count.to_le_bytes());
        end.extend_from_slice(&cd_size.to_le_bytes());
        end.extend_from_slice(&cd_offset.to_le_bytes());
        end.extend_from_slice(&0u16.to_le_bytes());
        self.write(&end)?;

        self.inner.flush()?;
        Ok((self.inner, self.entries))
    }
}
