//! Structural checks over the raw archive bytes, independent of any ZIP library.

use repack_archive::format::{
    CENTRAL_DIRECTORY_HEADER_LEN, CENTRAL_DIRECTORY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_LEN,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, LOCAL_FILE_HEADER_LEN, LOCAL_FILE_HEADER_SIGNATURE, MAX_COMMENT_LEN,
    ZIP64_MARKER_U16, ZIP64_MARKER_U32, decode_cp437, le_u16, le_u32,
};

use crate::report::{EocdRecord, Finding, FindingKind, LocalHeaderInfo, ReportBuilder};

/// One central directory record as found on disk.
#[derive(Clone, Debug)]
pub(crate) struct RawRecord {
    pub(crate) name:   Vec<u8>,
    pub(crate) flags:  u16,
    /// Method code as written, including codes no reader here understands.
    pub(crate) method: u16,
}

/// Run every byte-level check, returning the central directory records that
/// could be walked.
pub(crate) fn inspect(bytes: &[u8], report: &mut ReportBuilder) -> Vec<RawRecord> {
    if bytes.len() < END_OF_CENTRAL_DIRECTORY_LEN {
        report.error(Finding::new(
            FindingKind::TooSmall,
            format!("file is {} bytes, smaller than an end record", bytes.len()),
        ));
        return Vec::new();
    }

    let empty_archive = bytes.starts_with(&END_OF_CENTRAL_DIRECTORY_SIGNATURE);
    if !bytes.starts_with(&LOCAL_FILE_HEADER_SIGNATURE) && !empty_archive {
        report.error(Finding::new(
            FindingKind::BadSignature,
            format!("invalid leading signature {}", hex::encode(&bytes[..4])),
        ));
        return Vec::new();
    }
    report.details.first_local_header = first_local_header(bytes);

    let Some(eocd_offset) = find_end_record(bytes) else {
        report.error(Finding::new(FindingKind::MissingEndRecord, "end of central directory record not found"));
        return Vec::new();
    };
    let Some(eocd) = parse_end_record(bytes, eocd_offset) else {
        report.error(Finding::new(FindingKind::MissingEndRecord, "end of central directory record truncated"));
        return Vec::new();
    };
    report.details.eocd = Some(eocd.clone());

    if eocd.entries_total == ZIP64_MARKER_U16
        || eocd.central_dir_offset == ZIP64_MARKER_U32
        || eocd.central_dir_size == ZIP64_MARKER_U32
    {
        report.warning(Finding::new(FindingKind::Zip64, "ZIP64 markers present; central directory not walked"));
        return Vec::new();
    }

    if eocd.entries_total > 0 && !contains(bytes, &CENTRAL_DIRECTORY_SIGNATURE) {
        report.error(Finding::new(
            FindingKind::MissingCentralDirectory,
            "no central directory header signature in file",
        ));
    }

    let cd_offset = u64::from(eocd.central_dir_offset);
    let cd_end = cd_offset + u64::from(eocd.central_dir_size);
    if cd_end != eocd.offset {
        report.error(Finding::new(
            FindingKind::CentralDirectoryOffset,
            format!(
                "central directory offset={} size={} does not end at the end record ({})",
                eocd.central_dir_offset, eocd.central_dir_size, eocd.offset
            ),
        ));
        return Vec::new();
    }

    let records = walk_central_directory(bytes, &eocd, report);
    check_local_headers(bytes, &records, report);
    records.into_iter().map(|(record, _)| record).collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool { haystack.windows(needle.len()).any(|w| w == needle) }

/// Backward scan for the end record, bounded by the maximum comment length.
fn find_end_record(bytes: &[u8]) -> Option<usize> {
    let last = bytes.len().checked_sub(END_OF_CENTRAL_DIRECTORY_LEN)?;
    let first = last.saturating_sub(MAX_COMMENT_LEN);
    (first..=last).rev().find(|&i| bytes[i..i + 4] == END_OF_CENTRAL_DIRECTORY_SIGNATURE)
}

fn parse_end_record(bytes: &[u8], offset: usize) -> Option<EocdRecord> {
    Some(EocdRecord {
        offset:             offset as u64,
        entries_on_disk:    le_u16(bytes, offset + 8)?,
        entries_total:      le_u16(bytes, offset + 10)?,
        central_dir_size:   le_u32(bytes, offset + 12)?,
        central_dir_offset: le_u32(bytes, offset + 16)?,
        comment_length:     le_u16(bytes, offset + 20)?,
    })
}

/// Walk the central directory record by record; each record is paired with
/// the offset of its local header.
fn walk_central_directory(bytes: &[u8], eocd: &EocdRecord, report: &mut ReportBuilder) -> Vec<(RawRecord, usize)> {
    let end = eocd.offset as usize;
    let mut offset = eocd.central_dir_offset as usize;
    let mut records = Vec::with_capacity(usize::from(eocd.entries_total));

    while offset < end {
        let index = records.len();
        if bytes.get(offset..offset + 4) != Some(&CENTRAL_DIRECTORY_SIGNATURE[..]) {
            report.error(Finding::new(
                FindingKind::MissingCentralDirectory,
                format!("central directory record #{index} at {offset} has no signature"),
            ));
            break;
        }
        let fields = (|| {
            Some((
                le_u16(bytes, offset + 8)?,
                le_u16(bytes, offset + 10)?,
                usize::from(le_u16(bytes, offset + 28)?),
                usize::from(le_u16(bytes, offset + 30)?),
                usize::from(le_u16(bytes, offset + 32)?),
                le_u32(bytes, offset + 42)? as usize,
            ))
        })();
        let name_start = offset + CENTRAL_DIRECTORY_HEADER_LEN;
        let Some((flags, method, name_len, extra_len, comment_len, local_offset)) = fields
            .filter(|(_, _, name_len, ..)| name_start + name_len <= end)
        else {
            report.error(Finding::new(
                FindingKind::MissingCentralDirectory,
                format!("central directory record #{index} at {offset} is truncated"),
            ));
            break;
        };

        let name = bytes[name_start..name_start + name_len].to_vec();
        records.push((RawRecord { name, flags, method }, local_offset));
        offset = name_start + name_len + extra_len + comment_len;
    }

    if records.len() != usize::from(eocd.entries_total) {
        report.error(Finding::new(
            FindingKind::EntryCount,
            format!(
                "end record declares {} entries, central directory holds {}",
                eocd.entries_total,
                records.len()
            ),
        ));
    }
    records
}

fn check_local_headers(bytes: &[u8], records: &[(RawRecord, usize)], report: &mut ReportBuilder) {
    for (record, local_offset) in records {
        let name = String::from_utf8_lossy(&record.name).into_owned();
        if bytes.get(*local_offset..local_offset + 4) != Some(&LOCAL_FILE_HEADER_SIGNATURE[..]) {
            report.error(Finding::for_entry(
                FindingKind::LocalHeader,
                name,
                format!("no local file header at offset {local_offset}"),
            ));
            continue;
        }
        match le_u16(bytes, local_offset + 6) {
            Some(local_flags) if local_flags != record.flags => {
                report.warning(Finding::for_entry(
                    FindingKind::FlagMismatch,
                    name,
                    format!("local flags 0x{local_flags:04x} differ from central flags 0x{:04x}", record.flags),
                ));
            }
            Some(_) => {}
            None => report.error(Finding::for_entry(
                FindingKind::LocalHeader,
                name,
                format!("local file header at offset {local_offset} is truncated"),
            )),
        }
    }
}

fn first_local_header(bytes: &[u8]) -> Option<LocalHeaderInfo> {
    if !bytes.starts_with(&LOCAL_FILE_HEADER_SIGNATURE) {
        return None;
    }
    let name_length = le_u16(bytes, 26)?;
    let name = bytes.get(LOCAL_FILE_HEADER_LEN..LOCAL_FILE_HEADER_LEN + usize::from(name_length))?;
    Some(LocalHeaderInfo {
        version_needed: le_u16(bytes, 4)?,
        flags: le_u16(bytes, 6)?,
        method: le_u16(bytes, 8)?,
        name_length,
        extra_length: le_u16(bytes, 28)?,
        name_hex: hex::encode(name),
        name_utf8: std::str::from_utf8(name).ok().map(str::to_string),
        name_cp437: decode_cp437(name),
    })
}

#[cfg(test)]
mod tests {
    use repack_archive::ArchiveWriter;
    use repack_archive::format::FLAG_UTF8;

    use super::*;

    fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Vec::new());
        for (name, data) in files {
            writer.add_file(name, data, None).unwrap();
        }
        writer.finish().unwrap().0
    }

    fn run(bytes: &[u8]) -> (crate::VerificationReport, Vec<RawRecord>) {
        let mut builder = ReportBuilder::default();
        let records = inspect(bytes, &mut builder);
        (builder.build(), records)
    }

    #[test]
    fn clean_archive() {
        let bytes = archive(&[("a.txt", b"aaaa"), ("署名済み.txt", b"")]);
        let (report, records) = run(&bytes);
        assert!(report.is_ok(), "{:?}", report.errors());
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.flags & FLAG_UTF8 != 0));
        assert_eq!(records[1].name, "署名済み.txt".as_bytes());
        assert!(records.iter().all(|r| r.method == 8));

        let eocd = report.details().eocd.clone().unwrap();
        assert_eq!(eocd.entries_total, 2);
        assert_eq!(u64::from(eocd.central_dir_offset) + u64::from(eocd.central_dir_size), eocd.offset);

        let first = report.details().first_local_header.clone().unwrap();
        assert_eq!(first.flags, FLAG_UTF8);
        assert_eq!(first.method, 8);
        assert_eq!(first.name_hex, hex::encode("a.txt"));
        assert_eq!(first.name_cp437, "a.txt");
    }

    #[test]
    fn first_header_shows_both_name_decodings() {
        let (report, _) = run(&archive(&[("署名.txt", b"x")]));
        let first = report.details().first_local_header.clone().unwrap();
        assert_eq!(first.name_utf8.as_deref(), Some("署名.txt"));
        assert_eq!(first.name_cp437, "τ╜▓σÉì.txt");
    }

    #[test]
    fn empty_archive_is_valid() {
        let (report, records) = run(&archive(&[]));
        assert!(report.is_ok(), "{:?}", report.errors());
        assert!(records.is_empty());
        assert!(report.details().first_local_header.is_none());
    }

    #[test]
    fn too_small() {
        let (report, _) = run(b"PK\x03\x04");
        assert!(report.has_error(FindingKind::TooSmall));
    }

    #[test]
    fn bad_signature() {
        let mut bytes = archive(&[("a.txt", b"a")]);
        bytes[0] = b'X';
        let (report, _) = run(&bytes);
        assert!(report.has_error(FindingKind::BadSignature));
    }

    #[test]
    fn end_record_missing() {
        let mut bytes = archive(&[("a.txt", b"a")]);
        let eocd = bytes.len() - END_OF_CENTRAL_DIRECTORY_LEN;
        bytes[eocd] = 0;
        let (report, _) = run(&bytes);
        assert!(report.has_error(FindingKind::MissingEndRecord));
    }

    #[test]
    fn shifted_central_directory_offset() {
        let mut bytes = archive(&[("a.txt", b"a")]);
        let eocd = bytes.len() - END_OF_CENTRAL_DIRECTORY_LEN;
        bytes[eocd + 16] = bytes[eocd + 16].wrapping_add(1);
        let (report, _) = run(&bytes);
        assert!(report.has_error(FindingKind::CentralDirectoryOffset));
    }

    #[test]
    fn wrong_entry_total() {
        let mut bytes = archive(&[("a.txt", b"a"), ("b.txt", b"b")]);
        let eocd = bytes.len() - END_OF_CENTRAL_DIRECTORY_LEN;
        bytes[eocd + 10] = 3;
        let (report, records) = run(&bytes);
        assert!(report.has_error(FindingKind::EntryCount));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn local_flag_disagreement_is_a_warning() {
        let mut bytes = archive(&[("a.txt", b"a")]);
        bytes[6] = 0;
        bytes[7] = 0;
        let (report, _) = run(&bytes);
        assert!(report.is_ok());
        assert!(report.has_warning(FindingKind::FlagMismatch));
    }

    #[test]
    fn comment_does_not_hide_end_record() {
        let mut bytes = archive(&[("a.txt", b"a")]);
        let eocd = bytes.len() - END_OF_CENTRAL_DIRECTORY_LEN;
        bytes[eocd + 20] = 5;
        bytes.extend_from_slice(b"hello");
        let (report, _) = run(&bytes);
        assert!(report.is_ok(), "{:?}", report.errors());
        assert_eq!(report.details().eocd.as_ref().unwrap().comment_length, 5);
    }
}
