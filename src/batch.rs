//! Batch watermarking of a directory tree
//!
//! Every `*.pdf` under the input directory (matched case-insensitively, at any
//! depth) is written to the same relative path under the output directory.
//! Documents are processed one at a time; a failing document is reported and
//! skipped without affecting the others.

use std::path::{Path, PathBuf};
use glob::{glob_with, MatchOptions, Pattern};
use tracing::{info, warn};
use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use crate::pdf::{watermark_document_with, DocumentReport, OverlayCache};

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(PathBuf, DocumentReport)>,
    /// Failed inputs; each error carries the document path
    pub failed: Vec<Error>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Find PDF files under `input_dir`, sorted for a stable processing order
pub fn find_pdfs(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(Error::FileNotFound(input_dir.to_path_buf()));
    }

    let pattern = format!("{}/**/*.pdf", Pattern::escape(&input_dir.to_string_lossy()));
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut paths = Vec::new();
    for entry in glob_with(&pattern, options).map_err(|e| Error::InvalidGlob(e.to_string()))? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path: {}", e),
        }
    }

    if paths.is_empty() {
        return Err(Error::NoFilesMatched(pattern));
    }

    paths.sort();
    Ok(paths)
}

/// Output location mirroring `input`'s position under `input_dir`
pub fn mirrored_path(input: &Path, input_dir: &Path, output_dir: &Path) -> PathBuf {
    match input.strip_prefix(input_dir) {
        Ok(relative) => output_dir.join(relative),
        Err(_) => output_dir.join(input.file_name().unwrap_or(input.as_os_str())),
    }
}

/// Watermark every PDF under `input_dir` into `output_dir`
///
/// Only failures to enumerate the input are returned as errors; per-document
/// failures are collected in the report.
pub fn watermark_tree(input_dir: &Path, output_dir: &Path, config: &WatermarkConfig) -> Result<BatchReport> {
    config.validate()?;
    if config.uses_default_text() {
        warn!("Using the default watermark text; set primary_text to change it");
    }

    let inputs = find_pdfs(input_dir)?;
    info!(count = inputs.len(), input = %input_dir.display(), "found PDF files");

    let mut cache = OverlayCache::new();
    let mut report = BatchReport::default();
    let total = inputs.len();

    for (i, input) in inputs.into_iter().enumerate() {
        let output = mirrored_path(&input, input_dir, output_dir);
        match watermark_file(&input, &output, config, &mut cache) {
            Ok(doc_report) => {
                info!("[{}/{}] {} -> {}", i + 1, total, input.display(), output.display());
                report.succeeded.push((input, doc_report));
            }
            Err(e) => {
                warn!("[{}/{}] failed: {}", i + 1, total, e);
                report.failed.push(e);
            }
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "batch finished"
    );
    Ok(report)
}

fn watermark_file(input: &Path, output: &Path, config: &WatermarkConfig, cache: &mut OverlayCache) -> Result<DocumentReport> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::from(e).in_document(input))?;
    }
    watermark_document_with(input, output, config, cache).map_err(|e| e.in_document(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mirrored_path() {
        let out = mirrored_path(
            Path::new("in/reports/2024/q1.pdf"),
            Path::new("in"),
            Path::new("out"),
        );
        assert_eq!(out, PathBuf::from("out/reports/2024/q1.pdf"));
    }

    #[test]
    fn test_mirrored_path_outside_input_dir() {
        let out = mirrored_path(Path::new("elsewhere/a.pdf"), Path::new("in"), Path::new("out"));
        assert_eq!(out, PathBuf::from("out/a.pdf"));
    }

    #[test]
    fn test_find_pdfs_recursive_and_case_insensitive() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::write(root.join("a.pdf"), b"").unwrap();
        std::fs::write(root.join("nested/B.PDF"), b"").unwrap();
        std::fs::write(root.join("nested/deeper/c.pdf"), b"").unwrap();
        std::fs::write(root.join("notes.txt"), b"").unwrap();

        let found = find_pdfs(root).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.pdf"),
                PathBuf::from("nested/B.PDF"),
                PathBuf::from("nested/deeper/c.pdf"),
            ]
        );
    }

    #[test]
    fn test_find_pdfs_empty_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = find_pdfs(temp_dir.path());
        assert!(matches!(result, Err(Error::NoFilesMatched(_))));
    }

    #[test]
    fn test_find_pdfs_missing_directory() {
        let result = find_pdfs(Path::new("no-such-directory"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }
}
