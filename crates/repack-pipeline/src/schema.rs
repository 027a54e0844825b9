//! Declarative description of where archives sit inside each other.
//!
//! A schema is an ordered list of levels. Level `n` describes the extracted
//! contents of an archive at depth `n`: which directory holds the next
//! archives down, which file names count as targets, and which of those are
//! left alone. Archives at depth `levels.len()` are leaves and receive the
//! transforms.
//!
//! ```toml
//! [[levels]]
//! name = "root"
//! targets = "コネクト_*.zip"
//! exclude = ["3rd"]
//!
//! [levels.locate]
//! expected = "connect/バイナリ"
//! fallback_glob = "**/connect"
//! fallback_contains = "バイナリ"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const STEM: &str = "{stem}";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingSchema {
    #[serde(default)]
    pub levels: Vec<LevelSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub name:    String,
    #[serde(default)]
    pub locate:  LocateRule,
    /// Glob on the file name of candidate archives.
    pub targets: String,
    #[serde(default)]
    pub search:  SearchMode,
    /// Substrings, or globs when they contain `*`, `?` or `[`, matched on file names.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// How to find the container directory inside an extracted archive.
///
/// An empty `expected` names the extraction root itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocateRule {
    #[serde(default)]
    pub expected:          String,
    #[serde(default)]
    pub fallback_glob:     Option<String>,
    #[serde(default)]
    pub fallback_contains: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Direct,
    Recursive,
}

impl Default for NestingSchema {
    /// `connect/バイナリ/コネクト_*.zip` (minus third-party bundles), then
    /// every `*.xcframework.zip` below the bundle's own `{stem}` directory.
    fn default() -> Self {
        Self {
            levels: vec![
                LevelSpec {
                    name:    "root".into(),
                    locate:  LocateRule {
                        expected:          "connect/バイナリ".into(),
                        fallback_glob:     Some("**/connect".into()),
                        fallback_contains: Some("バイナリ".into()),
                    },
                    targets: "コネクト_*.zip".into(),
                    search:  SearchMode::Direct,
                    exclude: vec!["3rd".into()],
                },
                LevelSpec {
                    name:    "bundle".into(),
                    locate:  LocateRule {
                        expected:          STEM.into(),
                        fallback_glob:     None,
                        fallback_contains: None,
                    },
                    targets: "*.xcframework.zip".into(),
                    search:  SearchMode::Recursive,
                    exclude: Vec::new(),
                },
            ],
        }
    }
}

impl NestingSchema {
    /// Depth at which archives are leaves.
    pub fn leaf_depth(&self) -> usize { self.levels.len() }

    /// Compile every pattern once so bad configuration fails before any extraction.
    pub fn validate(&self) -> Result<()> {
        for level in &self.levels {
            compile(&level.targets)?;
            if let Some(glob) = &level.locate.fallback_glob {
                compile(glob)?;
            }
            for rule in level.exclude.iter().filter(|r| is_glob(r)) {
                compile(rule)?;
            }
        }
        Ok(())
    }
}

impl LocateRule {
    pub fn expected_for(&self, stem: &str) -> String { self.expected.replace(STEM, stem) }

    pub fn contains_for(&self, stem: &str) -> Option<String> {
        self.fallback_contains.as_ref().map(|c| c.replace(STEM, stem))
    }

    pub fn has_fallback(&self) -> bool { self.fallback_glob.is_some() || self.fallback_contains.is_some() }
}

impl LevelSpec {
    /// Whether `file_name` is left untouched at this level.
    pub fn is_excluded(&self, file_name: &str) -> Result<bool> {
        for rule in &self.exclude {
            let hit = if is_glob(rule) { compile(rule)?.matches(file_name) } else { file_name.contains(rule.as_str()) };
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub(crate) fn is_glob(rule: &str) -> bool { rule.contains(['*', '?', '[']) }

pub(crate) fn compile(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|e| PipelineError::InvalidPattern {
        pattern: pattern.to_string(),
        source:  e,
    })
}
