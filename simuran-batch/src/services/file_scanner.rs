//! Recording file scanner
//!
//! Recursive discovery of session files under a root directory, used by
//! loaders to build an index table (`Loader::index_files`).
//!
//! Two phases: sequential traversal (ignore patterns, symlink loop
//! detection) followed by parallel verification of each candidate's
//! extension and readability.

use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot access file
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

impl From<ScanError> for simuran_common::Error {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::PathNotFound(path) => {
                simuran_common::Error::SourceUnavailable(path.display().to_string())
            }
            ScanError::NotADirectory(path) => simuran_common::Error::Configuration(format!(
                "cannot index {}: not a directory",
                path.display()
            )),
            ScanError::FileAccessError(path, message) => simuran_common::Error::Io(
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("{}: {}", path.display(), message),
                ),
            ),
        }
    }
}

/// Recording file scanner
#[derive(Debug, Clone)]
pub struct FileScanner {
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    max_depth: Option<usize>,
}

impl FileScanner {
    /// Scanner accepting the given extensions (case-insensitive, no dot)
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git and any
    /// `sim_results` output tree.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                simuran_common::config::DEFAULT_OUTPUT_DIRNAME.to_string(),
            ],
            max_depth: None,
        }
    }

    /// Limit traversal depth (the root is depth 0)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    /// Scan a directory for matching files, sorted by path
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        // Phase 1: sequential traversal, symlink_visited is mutable
        let mut candidate_files = Vec::new();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .sort_by_file_name()
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.has_accepted_extension(entry.path()) {
                        candidate_files.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        tracing::debug!(
            "Found {} candidate data files under {}",
            candidate_files.len(),
            root_path.display()
        );

        // Phase 2: parallel readability check; collect keeps traversal order
        let files: Vec<PathBuf> = candidate_files
            .par_iter()
            .filter_map(|path| match self.verify_readable(path) {
                Ok(true) => Some(path.clone()),
                Ok(false) => None,
                Err(e) => {
                    tracing::warn!("Error verifying {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        tracing::debug!(
            "Verified {} of {} candidate data files",
            files.len(),
            candidate_files.len()
        );

        Ok(files)
    }

    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        // The root itself is never filtered out
        if entry.depth() > 0 && self.ignore_patterns.iter().any(|p| file_name.contains(p)) {
            return false;
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }

    fn has_accepted_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .map(|e| self.extensions.iter().any(|accepted| *accepted == e))
            .unwrap_or(false)
    }

    /// Non-empty and readable
    fn verify_readable(&self, path: &Path) -> Result<bool, ScanError> {
        let mut file = File::open(path)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;
        let mut buffer = [0u8; 1];
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;
        Ok(bytes_read > 0)
    }
}
