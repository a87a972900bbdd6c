//! Directory scanning for uploaded documents.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::UploadsConfig;
use crate::error::{Result, UploadsError};

/// A text document found in the uploads directory.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedDocument {
    /// Document id: the file name.
    pub id: String,

    /// Full path to the file.
    pub path: PathBuf,

    /// Raw file contents. Decoding is left to the normalizer.
    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// When the file was last modified.
    pub modified: Option<DateTime<Utc>>,
}

/// A file that matched the extension filter but was not loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    /// Path to the file.
    pub path: PathBuf,

    /// Why it was skipped.
    pub reason: String,
}

/// Result of a scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    /// Documents loaded, ordered by path.
    pub documents: Vec<UploadedDocument>,

    /// Candidate files that could not be used.
    pub skipped: Vec<SkippedFile>,

    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

/// Scans the uploads directory.
pub struct UploadScanner {
    /// Configuration.
    config: UploadsConfig,

    /// Compiled exclude patterns.
    excludes: Vec<glob::Pattern>,
}

impl UploadScanner {
    /// Create a scanner, compiling the exclude patterns.
    pub fn new(config: UploadsConfig) -> Result<Self> {
        let excludes = config.compiled_excludes()?;
        Ok(Self { config, excludes })
    }

    /// Get the configuration.
    pub fn config(&self) -> &UploadsConfig {
        &self.config
    }

    /// Check if a path (relative to the uploads root) is excluded.
    pub fn should_exclude(&self, relative: &Path) -> bool {
        let path_str = relative.to_string_lossy();
        self.excludes.iter().any(|glob| glob.matches(&path_str))
    }

    /// Walk the uploads directory and load every accepted text file.
    ///
    /// The file name is the document id. When two files share a name in
    /// different subdirectories, the first one walked wins (entries are
    /// visited depth first, sorted by name) and the rest are skipped.
    pub async fn scan(&self) -> Result<ScanResult> {
        let start = std::time::Instant::now();
        let root = &self.config.path;
        if !root.is_dir() {
            return Err(UploadsError::DirectoryNotFound(
                root.display().to_string(),
            ));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .max_depth(self.config.max_depth.unwrap_or(usize::MAX));

        let mut result = ScanResult::default();
        let mut seen_ids = HashSet::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable uploads entry: {err}");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.should_exclude(relative) || !self.config.accepts_extension(path) {
                debug!("Ignoring {}", relative.display());
                continue;
            }

            let Some(id) = path.file_name().and_then(|name| name.to_str()) else {
                result.skipped.push(skip(path, "file name is not valid UTF-8"));
                continue;
            };
            if !seen_ids.insert(id.to_string()) {
                result
                    .skipped
                    .push(skip(path, &format!("duplicate document id {id}")));
                continue;
            }

            match self.load(id, path).await {
                Ok(document) => result.documents.push(document),
                Err(reason) => result.skipped.push(skip(path, &reason)),
            }
        }

        result.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Scanned {} in {}ms: {} documents, {} skipped",
            root.display(),
            result.duration_ms,
            result.documents.len(),
            result.skipped.len()
        );
        Ok(result)
    }

    async fn load(&self, id: &str, path: &Path) -> std::result::Result<UploadedDocument, String> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|err| format!("cannot stat file: {err}"))?;
        if metadata.len() > self.config.max_file_size {
            return Err(format!(
                "file is {} bytes, limit is {}",
                metadata.len(),
                self.config.max_file_size
            ));
        }

        let bytes = fs::read(path)
            .await
            .map_err(|err| format!("cannot read file: {err}"))?;
        Ok(UploadedDocument {
            id: id.to_string(),
            path: path.to_path_buf(),
            bytes,
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

fn skip(path: &Path, reason: &str) -> SkippedFile {
    debug!("Skipping {}: {reason}", path.display());
    SkippedFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
