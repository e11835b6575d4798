//! Filesystem helpers: parent-directory creation, gzip detection, and the
//! single-wildcard file patterns used to discover per-individual matrices.

use crate::core::errors::{EdquantError, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Create parent directories for a path when missing.
pub fn make_parent_dirs<P: AsRef<Path>>(path: P) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Detect whether a path uses a gzip-compatible extension.
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> bool {
    matches!(
        path.as_ref().extension().unwrap_or_else(|| OsStr::new("")),
        ext if ext == "gz" || ext == "gzip" || ext == "bgzf"
    )
}

/// A filename pattern with exactly one `*` wildcard, e.g.
/// `*_final_editing_matrix_p4.tsv`. The wildcard segment identifies the
/// individual the file belongs to.
#[derive(Debug, Clone)]
pub struct FilePattern {
    prefix: String,
    suffix: String,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut parts = pattern.splitn(2, '*');
        let prefix = parts.next().unwrap_or("").to_string();
        let suffix = match parts.next() {
            Some(s) if !s.contains('*') => s.to_string(),
            _ => {
                return Err(EdquantError::InvalidInput(format!(
                    "File pattern must contain exactly one '*': {}",
                    pattern
                )))
            }
        };
        Ok(FilePattern { prefix, suffix })
    }

    /// Whether a bare filename matches the pattern.
    pub fn matches(&self, name: &str) -> bool {
        name.len() > self.prefix.len() + self.suffix.len()
            && name.starts_with(&self.prefix)
            && name.ends_with(&self.suffix)
    }

    /// Extract the wildcard segment of a matching filename.
    pub fn stem(&self, name: &str) -> Option<String> {
        if self.matches(name) {
            Some(name[self.prefix.len()..name.len() - self.suffix.len()].to_string())
        } else {
            None
        }
    }
}

/// List the files in `dir` whose names match `pattern`, sorted by filename so
/// downstream column order is deterministic.
pub fn find_matching_files(dir: &Path, pattern: &FilePattern) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if pattern.matches(name) {
                found.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_and_stem() {
        let pat = FilePattern::new("*_final_editing_matrix_p4.tsv").unwrap();
        assert!(pat.matches("IND_0001_final_editing_matrix_p4.tsv"));
        assert!(!pat.matches("_final_editing_matrix_p4.tsv"));
        assert!(!pat.matches("IND_0001_final_editing_matrix.tsv"));
        assert_eq!(
            pat.stem("IND_0001_final_editing_matrix_p4.tsv").unwrap(),
            "IND_0001"
        );
    }

    #[test]
    fn test_pattern_requires_single_wildcard() {
        assert!(FilePattern::new("no_wildcard.tsv").is_err());
        assert!(FilePattern::new("two*wild*cards").is_err());
        assert!(FilePattern::new("*.aei.tsv").is_ok());
    }

    #[test]
    fn test_gzip_detection() {
        assert!(is_gzipped("results.txt.gz"));
        assert!(!is_gzipped("results.txt"));
    }
}
