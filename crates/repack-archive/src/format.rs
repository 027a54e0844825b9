//! ZIP record layout shared by the writer and by byte-level inspectors.
//!
//! ```text
//! [Local File Header 1][File Data 1]
//! ...
//! [Local File Header n][File Data n]
//! [Central Directory Header 1] ... [Central Directory Header n]
//! [End of Central Directory]
//! ```
//!
//! ## End of Central Directory
//! | Offset | Size | Field                   |
//! |--------|------|-------------------------|
//! | 0x00   | 4    | Signature (PK\x05\x06)  |
//! | 0x04   | 2    | Number of this disk     |
//! | 0x06   | 2    | Disk with central dir   |
//! | 0x08   | 2    | Entries on this disk    |
//! | 0x0A   | 2    | Total entries           |
//! | 0x0C   | 4    | Central dir size        |
//! | 0x10   | 4    | Central dir offset      |
//! | 0x14   | 2    | Comment length          |

use std::fmt;

pub const LOCAL_FILE_HEADER_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
pub const CENTRAL_DIRECTORY_SIGNATURE: [u8; 4] = *b"PK\x01\x02";
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: [u8; 4] = *b"PK\x05\x06";

pub const LOCAL_FILE_HEADER_LEN: usize = 30;
pub const CENTRAL_DIRECTORY_HEADER_LEN: usize = 46;
pub const END_OF_CENTRAL_DIRECTORY_LEN: usize = 22;
pub const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// General purpose bit 0.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General purpose bit 3: sizes and CRC follow the data.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose bit 11 (language encoding): name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

pub const VERSION_NEEDED_STORED: u16 = 10;
pub const VERSION_NEEDED_DEFLATE: u16 = 20;
/// Host system 3 (Unix) in the high byte, spec version 2.0 in the low byte.
pub const VERSION_MADE_BY_UNIX: u16 = (3 << 8) | 20;

/// 1980-01-01, the earliest MS-DOS date.
pub const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;
pub const DOS_EPOCH_TIME: u16 = 0;

pub const DOS_ATTR_DIRECTORY: u32 = 0x10;

/// File type bits of a Unix mode, stored in the high half of the external attributes.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;

pub const ZIP64_MARKER_U16: u16 = u16::MAX;
pub const ZIP64_MARKER_U32: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Other(u16),
}

impl CompressionMethod {
    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => Self::Stored,
            8 => Self::Deflated,
            other => Self::Other(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Other(code) => code,
        }
    }
}

impl From<zip::CompressionMethod> for CompressionMethod {
    fn from(method: zip::CompressionMethod) -> Self {
        match method {
            zip::CompressionMethod::Stored => Self::Stored,
            zip::CompressionMethod::Deflated => Self::Deflated,
            // zip does not expose raw codes for the rest; none of them are writable here.
            _ => Self::Other(u16::MAX),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored => f.write_str("STORED"),
            Self::Deflated => f.write_str("DEFLATED"),
            Self::Other(code) => write!(f, "TYPE-{code}"),
        }
    }
}

/// Whether a Unix mode taken from the external attributes denotes a symlink.
pub fn is_symlink_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Upper half of code page 437, the name encoding when the UTF-8 flag is clear.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decode a raw name the way a reader without UTF-8 support would.
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b < 0x80 { char::from(b) } else { CP437_HIGH[usize::from(b - 0x80)] })
        .collect()
}

/// Read a little-endian `u16` at `offset`, or `None` past the end of `buf`.
pub fn le_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian `u32` at `offset`, or `None` past the end of `buf`.
pub fn le_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
