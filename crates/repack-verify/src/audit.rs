use repack_archive::format::FLAG_UTF8;

use crate::report::{Finding, FindingKind};

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1",
    "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const WINDOWS_FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Name rules an entry must satisfy to extract cleanly on the consuming host.
#[derive(Clone, Debug)]
pub struct CompatibilityRules {
    /// Longest entry name (in characters) before a warning is raised.
    pub max_path_len: usize,
    pub reserved_names: &'static [&'static str],
    pub forbidden_chars: &'static [char],
}

impl Default for CompatibilityRules {
    fn default() -> Self { Self::windows() }
}

impl CompatibilityRules {
    /// Windows Explorer limits, leaving headroom under `MAX_PATH` for the extraction directory.
    pub fn windows() -> Self {
        Self {
            max_path_len:    200,
            reserved_names:  WINDOWS_RESERVED,
            forbidden_chars: WINDOWS_FORBIDDEN,
        }
    }

    /// Warnings for one entry name. `flags` are the stored general purpose
    /// flags; without them the UTF-8 flag check is skipped.
    pub fn audit(&self, name: &str, flags: Option<u16>) -> Vec<Finding> {
        let mut findings = Vec::new();

        let length = name.chars().count();
        if length > self.max_path_len {
            findings.push(Finding::for_entry(
                FindingKind::PathTooLong,
                name,
                format!("name is {length} characters, limit is {}", self.max_path_len),
            ));
        }

        for segment in name.split(['/', '\\']).filter(|s| !s.is_empty()) {
            let stem = segment.split('.').next().unwrap_or(segment);
            if self.reserved_names.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
                findings.push(Finding::for_entry(
                    FindingKind::ReservedName,
                    name,
                    format!("'{segment}' is a reserved device name"),
                ));
            }

            if let Some(c) = segment.chars().find(|c| self.forbidden_chars.contains(c) || c.is_control()) {
                findings.push(Finding::for_entry(
                    FindingKind::ForbiddenCharacter,
                    name,
                    format!("'{segment}' contains forbidden character {c:?}"),
                ));
            } else if segment.ends_with('.') || segment.ends_with(' ') {
                findings.push(Finding::for_entry(
                    FindingKind::ForbiddenCharacter,
                    name,
                    format!("'{segment}' ends with a dot or space"),
                ));
            }
        }

        if let Some(flags) = flags.filter(|f| f & FLAG_UTF8 == 0 && !name.is_ascii()) {
            findings.push(Finding::for_entry(
                FindingKind::MissingUtf8Flag,
                name,
                format!("non-ASCII name without the UTF-8 flag (flags 0x{flags:04x})"),
            ));
        }

        findings
    }
}

/// Warning when an entry grew under compression.
pub fn compression_ratio(name: &str, compressed_size: u64, size: u64) -> Option<Finding> {
    if size == 0 {
        return None;
    }
    let ratio = compressed_size as f64 / size as f64;
    (ratio > 1.0).then(|| {
        Finding::for_entry(
            FindingKind::CompressionRatio,
            name,
            format!("compressed size exceeds original ({ratio:.2})"),
        )
    })
}
