//! Configuration for the uploads directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, UploadsError};

/// Default cap on a single upload (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Where uploaded documents live and which of them to pick up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    /// Path to the uploads directory.
    pub path: PathBuf,

    /// File extensions treated as text documents (without the dot).
    pub extensions: Vec<String>,

    /// Patterns to exclude (glob patterns).
    pub exclude_patterns: Vec<String>,

    /// Maximum depth to recurse (None = unlimited).
    pub max_depth: Option<usize>,

    /// Files larger than this are skipped.
    pub max_file_size: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self::new("uploads")
    }
}

impl UploadsConfig {
    /// Create a config for the given directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extensions: vec!["txt".to_string(), "md".to_string(), "text".to_string()],
            exclude_patterns: vec![
                "**/.*".to_string(),
                "**/*~".to_string(),
                "**/*.tmp".to_string(),
            ],
            max_depth: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Set the maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set the per-file size cap.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Replace the accepted extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Compile the exclude patterns, failing on the first invalid one.
    pub fn compiled_excludes(&self) -> Result<Vec<glob::Pattern>> {
        self.exclude_patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|err| UploadsError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })
            })
            .collect()
    }

    /// Check if a path has one of the accepted extensions.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(ext))
            })
    }
}
