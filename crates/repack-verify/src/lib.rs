//! Integrity and compatibility verification for ZIP archives.
//!
//! Two independent passes feed one [`VerificationReport`]:
//!
//! - a byte-level walk of the end record, central directory and local
//!   headers that never goes through a ZIP library;
//! - a payload pass through the `zip` crate that recomputes every CRC-32
//!   with a [`VerifiedReader`].
//!
//! Name rules for the consuming host are applied per entry by
//! [`CompatibilityRules`]. Only an unreadable file is an `Err`; everything
//! else ends up as a finding in the report.
//!
//! # Example
//!
//! ```no_run
//! let report = repack_verify::verify_archive("signed/20260105.zip")?;
//! for warning in report.warnings() {
//!     println!("{}", warning.message);
//! }
//! # Ok::<(), repack_verify::VerifyError>(())
//! ```

pub use self::audit::{CompatibilityRules, compression_ratio};
pub use self::error::{Result, VerifyError};
pub use self::hasher::{Crc32Hasher, Hasher};
pub use self::reader::VerifiedReader;
pub use self::report::{
    EntryDetail, EocdRecord, Finding, FindingKind, LocalHeaderInfo, ReportDetails, VerificationReport,
};

mod audit;
mod error;
mod hasher;
mod raw;
mod reader;
mod report;

use std::io::{self, Cursor, Read};
use std::path::Path;

use flate2::read::DeflateDecoder;
use repack_archive::format::{CompressionMethod, FLAG_ENCRYPTED};
use zip::ZipArchive;

use self::raw::RawRecord;
use self::report::ReportBuilder;

/// Verify the archive at `path` with the Windows rule set.
pub fn verify_archive(path: impl AsRef<Path>) -> Result<VerificationReport> {
    IntegrityVerifier::new().verify_path(path)
}

#[derive(Clone, Debug, Default)]
pub struct IntegrityVerifier {
    rules: CompatibilityRules,
}

impl IntegrityVerifier {
    pub fn new() -> Self { Self::default() }

    pub fn with_rules(rules: CompatibilityRules) -> Self { Self { rules } }

    pub fn verify_path(&self, path: impl AsRef<Path>) -> Result<VerificationReport> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| VerifyError::Unreadable {
            path:   path.to_path_buf(),
            source: e,
        })?;
        let report = self.verify_bytes(&bytes);
        if report.is_ok() {
            tracing::info!(
                archive = %path.display(),
                entries = report.details().entry_count,
                warnings = report.warnings().len(),
                "archive verified"
            );
        } else {
            tracing::warn!(
                archive = %path.display(),
                errors = report.errors().len(),
                warnings = report.warnings().len(),
                "archive failed verification"
            );
        }
        Ok(report)
    }

    pub fn verify_bytes(&self, bytes: &[u8]) -> VerificationReport {
        let mut builder = ReportBuilder::default();
        builder.details.file_size = bytes.len() as u64;

        let raw = raw::inspect(bytes, &mut builder);
        self.check_entries(bytes, &raw, &mut builder);
        builder.build()
    }

    fn check_entries(&self, bytes: &[u8], raw: &[RawRecord], report: &mut ReportBuilder) {
        let mut zip = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(zip) => zip,
            Err(e) => {
                report.error(Finding::new(FindingKind::OpenFailed, format!("cannot open archive: {e}")));
                return;
            }
        };
        report.details.entry_count = zip.len();
        // Flags only line up with the zip crate's order if the raw walk saw every record.
        let raw = (raw.len() == zip.len()).then_some(raw);

        for index in 0..zip.len() {
            let mut record = match zip.by_index_raw(index) {
                Ok(record) => record,
                Err(e) => {
                    report.error(Finding::new(FindingKind::ReadFailed, format!("entry #{index}: {e}")));
                    continue;
                }
            };

            let raw_record = raw.map(|r| &r[index]);
            let flags = raw_record.map(|r| r.flags);
            let name = raw_record
                .map(|r| String::from_utf8_lossy(&r.name).into_owned())
                .unwrap_or_else(|| record.name().to_string());
            let method = raw_record
                .map(|r| CompressionMethod::from_u16(r.method))
                .unwrap_or_else(|| CompressionMethod::from(record.compression()));
            let (size, compressed_size, crc32) = (record.size(), record.compressed_size(), record.crc32());

            let crc_verified = if flags.is_some_and(|f| f & FLAG_ENCRYPTED != 0) {
                report.warning(Finding::for_entry(FindingKind::Encrypted, &name, "encrypted entry not checked"));
                false
            } else {
                let outcome = match method {
                    CompressionMethod::Stored => Some(check_payload(&mut record, &name, crc32, size)),
                    CompressionMethod::Deflated => {
                        Some(check_payload(DeflateDecoder::new(&mut record), &name, crc32, size))
                    }
                    CompressionMethod::Other(_) => None,
                };
                match outcome {
                    Some(Ok(())) => true,
                    Some(Err(finding)) => {
                        report.error(finding);
                        false
                    }
                    None => {
                        report.warning(Finding::for_entry(
                            FindingKind::UnsupportedMethod,
                            &name,
                            format!("method {method} not checked"),
                        ));
                        false
                    }
                }
            };

            for finding in self.rules.audit(&name, flags) {
                report.warning(finding);
            }
            if let Some(finding) = compression_ratio(&name, compressed_size, size) {
                report.warning(finding);
            }

            tracing::debug!(entry = %name, %method, size, crc_verified, "checked entry");
            report.details.entries.push(EntryDetail {
                name,
                method: method.to_string(),
                compressed_size,
                size,
                crc32,
                flags,
                crc_verified,
            });
        }
    }
}

fn check_payload<R: Read>(reader: R, name: &str, crc32: u32, size: u64) -> std::result::Result<(), Finding> {
    let mut verified = VerifiedReader::new(reader, Crc32Hasher::new());
    io::copy(&mut verified, &mut io::sink())
        .map_err(|e| Finding::for_entry(FindingKind::ReadFailed, name, format!("read error: {e}")))?;

    let read = verified.bytes_read();
    verified
        .finish(&Crc32Hasher::encode(crc32))
        .map_err(|e| Finding::for_entry(FindingKind::ChecksumMismatch, name, e.to_string()))?;
    if read != size {
        return Err(Finding::for_entry(
            FindingKind::ReadFailed,
            name,
            format!("declared {size} bytes, read {read}"),
        ));
    }
    Ok(())
}
