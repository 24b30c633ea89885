//! Import candidate scanner
//!
//! Recursive discovery of image files under a root folder, feeding the
//! counting phase of the import pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// Extensions accepted as import candidates
const IMAGE_EXTENSIONS: &[&str] = &[
    "tif", "tiff", "png", "jpg", "jpeg", "dv", "lsm", "czi", "nd2", "lif", "oib", "ims",
];

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Scan result with statistics
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Candidate file paths found, in traversal order
    pub files: Vec<PathBuf>,
    /// Total size of all candidates in bytes
    pub total_size: u64,
    /// Count of files by extension
    pub by_format: HashMap<String, usize>,
    /// Non-fatal traversal errors encountered
    pub errors: Vec<String>,
}

/// Recursive image file scanner
pub struct FileScanner {
    ignore_patterns: Vec<String>,
    max_depth: Option<usize>,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileScanner {
    /// Scanner with default ignore patterns for system and VCS files
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Scan a directory tree for import candidates
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut result = ScanResult::default();
        let mut walker = WalkDir::new(root).follow_links(false);
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        for entry in walker.into_iter().filter_entry(|e| !self.is_ignored(e.path())) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Scan entry skipped");
                    result.errors.push(e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(extension) = candidate_extension(entry.path()) else {
                continue;
            };
            match entry.metadata() {
                Ok(meta) => result.total_size += meta.len(),
                Err(e) => result.errors.push(e.to_string()),
            }
            *result.by_format.entry(extension).or_insert(0) += 1;
            result.files.push(entry.path().to_path_buf());
        }
        Ok(result)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| self.ignore_patterns.iter().any(|p| p == name))
            .unwrap_or(false)
    }
}

fn candidate_extension(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_image_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tiff"), b"data").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"notes").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.png"), b"xy").unwrap();

        let result = FileScanner::new().scan(dir.path()).unwrap();
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.total_size, 6);
        assert_eq!(result.by_format["tiff"], 1);
        assert_eq!(result.by_format["png"], 1);
    }

    #[test]
    fn ignores_vcs_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("x.tiff"), b"data").unwrap();
        std::fs::write(dir.path().join("ok.tiff"), b"data").unwrap();

        let result = FileScanner::new().scan(dir.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("ok.tiff"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = FileScanner::new().scan(Path::new("/nonexistent/vitrea"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn file_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.tiff");
        std::fs::write(&file, b"data").unwrap();
        assert!(matches!(
            FileScanner::new().scan(&file),
            Err(ScanError::NotADirectory(_))
        ));
    }
}
