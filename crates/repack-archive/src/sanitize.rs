use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Result of resolving an archive member path against a destination root.
#[derive(Clone, Debug)]
pub struct SanitizedPath {
    pub original: String,
    /// Normalized path relative to the root, without `.` or `..` segments.
    pub relative: PathBuf,
    pub resolved: PathBuf,
}

impl SanitizedPath {
    /// True when the member names the root itself (e.g. `./`).
    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }
}

/// Resolve `member` (as declared inside an archive) below `root`.
///
/// Backslashes count as separators so that archives written on Windows are
/// judged the same way a Windows reader would. Absolute paths, drive
/// prefixes and `..` segments that climb above `root` are rejected.
pub fn resolve_member(root: impl AsRef<Path>, member: &str) -> Result<SanitizedPath> {
    let root = root.as_ref();
    let segments = member_segments(root, member)?;
    finish(root, member, &segments)
}

/// Key under which a member is looked up when resolving link targets:
/// its normalized segments joined by `/`.
pub(crate) fn member_key(member: &str) -> Result<String> {
    Ok(member_segments(Path::new(""), member)?.join("/"))
}

/// Resolve the target of the symlink member `link` below `root`.
///
/// The target is taken relative to the link's parent. Segments that name
/// another link of the same archive (`links`, keyed by [`member_key`]) are
/// replaced by that link's target, so a chain of links cannot climb out of
/// `root` once the links exist on disk.
pub(crate) fn resolve_link_target(
    root: impl AsRef<Path>,
    link: &str,
    target: &str,
    links: &HashMap<String, String>,
) -> Result<SanitizedPath> {
    let root = root.as_ref();
    let escape = || Error::PathEscape {
        entry:    link.to_string(),
        resolved: root.join(target.replace('\\', "/")),
    };

    check_target(link, target)?;
    if is_absolute(target) {
        return Err(escape());
    }

    let mut parent = member_segments(root, link)?;
    parent.pop();
    let mut pending: VecDeque<String> = parent.into_iter().chain(split(target)).map(str::to_string).collect();

    let mut out: Vec<String> = Vec::new();
    let mut hops = 0;
    while let Some(segment) = pending.pop_front() {
        match segment.as_str() {
            "" | "." => {}
            ".." => {
                if out.pop().is_none() {
                    return Err(escape());
                }
            }
            _ => {
                out.push(segment);
                let Some(next) = links.get(&out.join("/")) else {
                    continue;
                };
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return Err(Error::InvalidPath {
                        entry:  link.to_string(),
                        reason: "too many levels of symbolic links",
                    });
                }
                check_target(link, next)?;
                if is_absolute(next) {
                    return Err(escape());
                }
                out.pop();
                for part in split(next).rev() {
                    pending.push_front(part.to_string());
                }
            }
        }
    }

    let segments: Vec<&str> = out.iter().map(String::as_str).collect();
    finish(root, target, &segments).map_err(|_| escape())
}

const MAX_LINK_HOPS: usize = 40;

fn member_segments<'a>(root: &Path, member: &'a str) -> Result<Vec<&'a str>> {
    if member.contains('\0') {
        return Err(Error::InvalidPath {
            entry:  member.to_string(),
            reason: "contains NUL byte",
        });
    }

    let escape = || Error::PathEscape {
        entry:    member.to_string(),
        resolved: root.join(member.replace('\\', "/")),
    };

    if is_absolute(member) {
        return Err(escape());
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in split(member) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(escape());
                }
            }
            normal => segments.push(normal),
        }
    }
    Ok(segments)
}

fn finish(root: &Path, original: &str, segments: &[&str]) -> Result<SanitizedPath> {
    let relative: PathBuf = segments.iter().collect();
    let resolved = root.join(&relative);

    if !resolved.starts_with(root) {
        return Err(Error::PathEscape {
            entry: original.to_string(),
            resolved,
        });
    }

    Ok(SanitizedPath {
        original: original.to_string(),
        relative,
        resolved,
    })
}

fn check_target(link: &str, target: &str) -> Result<()> {
    let reason = if target.is_empty() {
        "empty symlink target"
    } else if target.contains('\0') {
        "symlink target contains NUL byte"
    } else {
        return Ok(());
    };
    Err(Error::InvalidPath {
        entry: link.to_string(),
        reason,
    })
}

fn split(path: &str) -> impl DoubleEndedIterator<Item = &str> {
    path.split(['/', '\\'])
}

fn is_absolute(path: &str) -> bool {
    path.starts_with(['/', '\\']) || has_drive_prefix(path)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
