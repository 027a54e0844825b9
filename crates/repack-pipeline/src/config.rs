use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schema::NestingSchema;
use crate::transform::{DEFAULT_MARKER_CONTENT, DEFAULT_MARKER_NAME, MarkerTransform, TransformError};

/// Settings for a processing run, loaded from TOML. Every field is optional.
///
/// ```toml
/// output_dir = "signed"
/// work_root = "/tmp"
///
/// [marker]
/// file_name = "署名済み.txt"
///
/// [[schema.levels]]
/// name = "root"
/// targets = "*.zip"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepackConfig {
    pub output_dir: PathBuf,
    /// Parent for work areas; the system temp directory when unset.
    pub work_root:  Option<PathBuf>,
    pub schema:     NestingSchema,
    pub marker:     MarkerConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub file_name: String,
    pub content:   String,
}

impl Default for RepackConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("signed"),
            work_root:  None,
            schema:     NestingSchema::default(),
            marker:     MarkerConfig::default(),
        }
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_MARKER_NAME.to_string(),
            content:   DEFAULT_MARKER_CONTENT.to_string(),
        }
    }
}

impl MarkerConfig {
    pub fn to_transform(&self) -> Result<MarkerTransform, TransformError> {
        MarkerTransform::new(self.file_name.clone(), self.content.clone().into_bytes())
    }
}

impl RepackConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path:   path.to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path:   path.to_path_buf(),
            source: e,
        })?;
        config.schema.validate().map_err(|e| ConfigError::Schema {
            path:   path.to_path_buf(),
            source: e,
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SearchMode;

    #[test]
    fn empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repack.toml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(RepackConfig::from_path(&path).unwrap(), RepackConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repack.toml");
        std::fs::write(
            &path,
            r#"
            output_dir = "out"
            work_root = "/tmp/w"

            [marker]
            file_name = "SIGNED"

            [[schema.levels]]
            name = "only"
            targets = "*.pkg.zip"
            search = "recursive"
            "#,
        )
        .unwrap();

        let config = RepackConfig::from_path(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.work_root, Some(PathBuf::from("/tmp/w")));
        assert_eq!(config.marker.file_name, "SIGNED");
        assert_eq!(config.marker.content, DEFAULT_MARKER_CONTENT);
        assert_eq!(config.schema.levels.len(), 1);
        assert_eq!(config.schema.levels[0].search, SearchMode::Recursive);
    }

    #[test]
    fn invalid_pattern_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repack.toml");
        std::fs::write(&path, "[[schema.levels]]\nname = \"x\"\ntargets = \"[\"\n").unwrap();
        assert!(matches!(RepackConfig::from_path(&path), Err(ConfigError::Schema { .. })));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RepackConfig::from_path(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
