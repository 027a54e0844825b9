use std::path::{Path, PathBuf};

use glob::MatchOptions;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::schema::{LevelSpec, LocateRule, SearchMode, compile};

const MISMATCH_LISTING: usize = 10;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive:              true,
    require_literal_separator:   true,
    require_literal_leading_dot: false,
};

/// Container directory chosen for one level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located {
    pub path:       PathBuf,
    /// True when the expected path was missing and a fallback candidate was used.
    pub fallback:   bool,
    /// Every fallback candidate, sorted; more than one means the choice was ambiguous.
    pub candidates: Vec<PathBuf>,
}

impl Located {
    pub fn is_ambiguous(&self) -> bool { self.candidates.len() > 1 }
}

/// Archives found at one level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Targets {
    pub process:  Vec<PathBuf>,
    pub excluded: Vec<PathBuf>,
}

/// Find the container directory described by `rule` inside `dir`.
pub fn locate(dir: &Path, rule: &LocateRule, stem: &str) -> Result<Located> {
    let expected = rule.expected_for(stem);
    let exact = dir.join(&expected);
    if exact.is_dir() {
        return Ok(Located {
            path:       exact,
            fallback:   false,
            candidates: Vec::new(),
        });
    }

    let mut candidates = fallback_candidates(dir, rule, stem)?;
    candidates.sort();
    candidates.dedup();

    let Some(first) = candidates.first().cloned() else {
        return Err(PipelineError::SchemaMismatch {
            dir: dir.to_path_buf(),
            expected,
            found: list_tree(dir, MISMATCH_LISTING),
        });
    };

    if candidates.len() > 1 {
        tracing::warn!(
            dir = %dir.display(),
            expected = %expected,
            chosen = %first.display(),
            candidates = candidates.len(),
            "ambiguous fallback, using the first candidate"
        );
    } else {
        tracing::warn!(dir = %dir.display(), expected = %expected, chosen = %first.display(), "using fallback");
    }

    Ok(Located {
        path: first,
        fallback: true,
        candidates,
    })
}

fn fallback_candidates(dir: &Path, rule: &LocateRule, stem: &str) -> Result<Vec<PathBuf>> {
    if !rule.has_fallback() {
        return Ok(subdirectories(dir));
    }

    let roots = match &rule.fallback_glob {
        Some(glob) => {
            let pattern = compile(glob)?;
            walk_directories(dir)
                .filter(|path| {
                    path.strip_prefix(dir)
                        .is_ok_and(|rel| pattern.matches_path_with(rel, MATCH_OPTIONS))
                })
                .collect()
        }
        None => vec![dir.to_path_buf()],
    };

    Ok(match rule.contains_for(stem) {
        Some(needle) => roots
            .iter()
            .flat_map(|root| subdirectories(root))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(needle.as_str()))
            })
            .collect(),
        None => roots,
    })
}

fn walk_directories(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}

/// List the archives `level` targets under `dir`, sorted by path.
pub fn find_targets(dir: &Path, level: &LevelSpec) -> Result<Targets> {
    let pattern = compile(&level.targets)?;
    let depth = match level.search {
        SearchMode::Direct => 1,
        SearchMode::Recursive => usize::MAX,
    };

    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(depth)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|n| pattern.matches(n)))
        .map(|e| e.into_path())
        .collect();
    found.sort();

    let mut targets = Targets::default();
    for path in found {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if level.is_excluded(name)? {
            targets.excluded.push(path);
        } else {
            targets.process.push(path);
        }
    }
    Ok(targets)
}

/// First `limit` paths under `dir`, relative and sorted, for error reports.
pub fn list_tree(dir: &Path, limit: usize) -> Vec<String> {
    let mut paths: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.path()
                .strip_prefix(dir)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    paths.sort();
    paths.truncate(limit);
    paths
}
