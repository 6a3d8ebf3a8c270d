use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ImportError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    pub name: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub import: ImportOptions,
    #[serde(default)]
    pub suffix: SuffixConfig,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Legacy CSV exports. Relative paths resolve against the config file's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub comments: String,
    pub authors: String,
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; `--store` / `BACKFILL_STORE` take precedence.
    pub path: Option<String>,
    pub comments_table: String,
    pub parents_table: String,
    pub authors_table: String,
    /// Column on the comments table holding the parent id.
    pub parent_column: String,
    /// Column on the parents table holding the child count.
    pub count_column: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            comments_table: "comments".into(),
            parents_table: "images".into(),
            authors_table: "users".into(),
            parent_column: "image_id".into(),
            count_column: "comments_count".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Node URL; `--search-node` / `BACKFILL_SEARCH_NODE` take precedence.
    pub node: Option<String>,
    pub index: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            node: None,
            index: "comments".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Import behaviour
// ---------------------------------------------------------------------------

pub const DEFAULT_BATCH_SIZE: usize = 250;
pub const DEFAULT_PARENT_MARKER_BASE: &str = "https://derpibooru.org/images";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// When false the run derives and previews but writes nothing.
    pub enabled: bool,
    /// Re-write records already present in the remap file.
    pub replace_existing: bool,
    /// Unmatched authors become anonymous instead of the fallback author.
    pub anonymous_fallback: bool,
    pub fallback_author_id: Option<i64>,
    pub batch_size: usize,
    pub remap_file: Option<String>,
    /// URL prefix of the `Original: <base>/<id>` marker in parent descriptions.
    pub parent_marker_base: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            replace_existing: true,
            anonymous_fallback: true,
            fallback_author_id: None,
            batch_size: DEFAULT_BATCH_SIZE,
            remap_file: None,
            parent_marker_base: DEFAULT_PARENT_MARKER_BASE.into(),
        }
    }
}

/// Templates appended to every body. `${user.name}` and `${record.<field>}`
/// are substituted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SuffixConfig {
    pub author_found: String,
    pub author_missing: String,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ImportConfig {
    pub fn from_toml(input: &str) -> Result<Self, ImportError> {
        let config: ImportConfig =
            toml::from_str(input).map_err(|e| ImportError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ImportError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ImportError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.source.comments.trim().is_empty() {
            return Err(ImportError::ConfigValidation("source.comments is empty".into()));
        }
        if self.source.authors.trim().is_empty() {
            return Err(ImportError::ConfigValidation("source.authors is empty".into()));
        }

        if self.import.batch_size == 0 {
            return Err(ImportError::ConfigValidation(
                "import.batch_size must be at least 1".into(),
            ));
        }

        // Without the anonymous fallback unmatched authors need somewhere to go
        if !self.import.anonymous_fallback && self.import.fallback_author_id.is_none() {
            return Err(ImportError::ConfigValidation(
                "import.fallback_author_id is required when anonymous_fallback = false".into(),
            ));
        }

        let names = [
            ("store.comments_table", &self.store.comments_table),
            ("store.parents_table", &self.store.parents_table),
            ("store.authors_table", &self.store.authors_table),
            ("store.parent_column", &self.store.parent_column),
            ("store.count_column", &self.store.count_column),
            ("search.index", &self.search.index),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                return Err(ImportError::ConfigValidation(format!("{key} is empty")));
            }
        }

        Ok(())
    }

    /// Tables that must exist before anything is read or written.
    pub fn required_tables(&self) -> [&str; 3] {
        [
            self.store.parents_table.as_str(),
            self.store.comments_table.as_str(),
            self.store.authors_table.as_str(),
        ]
    }
}

/// Resolve a config-relative path against `base_dir`.
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
