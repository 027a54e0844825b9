use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    TooSmall,
    BadSignature,
    MissingCentralDirectory,
    MissingEndRecord,
    CentralDirectoryOffset,
    EntryCount,
    LocalHeader,
    Zip64,
    OpenFailed,
    ChecksumMismatch,
    ReadFailed,
    UnsupportedMethod,
    Encrypted,
    PathTooLong,
    ReservedName,
    ForbiddenCharacter,
    MissingUtf8Flag,
    CompressionRatio,
    FlagMismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind:    FindingKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry:   Option<String>,
    pub message: String,
}

impl Finding {
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            entry: None,
            message: message.into(),
        }
    }

    pub fn for_entry(kind: FindingKind, entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            entry: Some(entry.into()),
            message: message.into(),
        }
    }
}

/// Parsed end-of-central-directory record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EocdRecord {
    pub offset:             u64,
    pub entries_on_disk:    u16,
    pub entries_total:      u16,
    pub central_dir_size:   u32,
    pub central_dir_offset: u32,
    pub comment_length:     u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryDetail {
    pub name:            String,
    pub method:          String,
    pub compressed_size: u64,
    pub size:            u64,
    pub crc32:           u32,
    /// Flags from the central directory, when the raw walk reached this record.
    pub flags:           Option<u16>,
    pub crc_verified:    bool,
}

/// Fields of the first local file header, which is what most readers judge first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalHeaderInfo {
    pub version_needed: u16,
    pub flags:          u16,
    pub method:         u16,
    pub name_length:    u16,
    pub extra_length:   u16,
    pub name_hex:       String,
    pub name_utf8:      Option<String>,
    /// The same bytes as a reader without UTF-8 support decodes them.
    pub name_cp437:     String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportDetails {
    pub file_size:          u64,
    pub entry_count:        usize,
    pub eocd:               Option<EocdRecord>,
    pub entries:            Vec<EntryDetail>,
    pub first_local_header: Option<LocalHeaderInfo>,
}

/// Outcome of verifying one archive. Built once, never mutated afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct VerificationReport {
    valid:    bool,
    errors:   Vec<Finding>,
    warnings: Vec<Finding>,
    details:  ReportDetails,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool { self.valid }

    pub fn errors(&self) -> &[Finding] { &self.errors }

    pub fn warnings(&self) -> &[Finding] { &self.warnings }

    pub fn details(&self) -> &ReportDetails { &self.details }

    pub fn has_error(&self, kind: FindingKind) -> bool { self.errors.iter().any(|f| f.kind == kind) }

    pub fn has_warning(&self, kind: FindingKind) -> bool { self.warnings.iter().any(|f| f.kind == kind) }

    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }
}

#[derive(Default)]
pub(crate) struct ReportBuilder {
    errors:   Vec<Finding>,
    warnings: Vec<Finding>,
    pub(crate) details: ReportDetails,
}

impl ReportBuilder {
    pub(crate) fn error(&mut self, finding: Finding) {
        tracing::debug!(kind = ?finding.kind, message = %finding.message, "verification error");
        self.errors.push(finding);
    }

    pub(crate) fn warning(&mut self, finding: Finding) {
        tracing::debug!(kind = ?finding.kind, message = %finding.message, "verification warning");
        self.warnings.push(finding);
    }

    pub(crate) fn build(self) -> VerificationReport {
        VerificationReport {
            valid:    self.errors.is_empty(),
            errors:   self.errors,
            warnings: self.warnings,
            details:  self.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_follows_errors_only() {
        let mut builder = ReportBuilder::default();
        builder.warning(Finding::new(FindingKind::CompressionRatio, "a.txt grew"));
        let report = builder.build();
        assert!(report.is_ok());
        assert!(report.has_warning(FindingKind::CompressionRatio));

        let mut builder = ReportBuilder::default();
        builder.error(Finding::for_entry(FindingKind::ChecksumMismatch, "a.txt", "crc"));
        let report = builder.build();
        assert!(!report.is_ok());
        assert_eq!(report.errors()[0].entry.as_deref(), Some("a.txt"));
    }

    #[test]
    fn json_uses_snake_case_kinds() {
        let mut builder = ReportBuilder::default();
        builder.warning(Finding::new(FindingKind::MissingUtf8Flag, "flag"));
        let json = builder.build().to_json().unwrap();
        assert!(json.contains("\"missing_utf8_flag\""));
        assert!(json.contains("\"valid\": true"));
    }
}
