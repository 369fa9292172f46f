//! Error types for the watermarking library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the watermarking library
#[derive(Error, Debug)]
pub enum Error {
    /// Page dimensions that cannot host an overlay
    #[error("Invalid page geometry: {width} x {height}")]
    InvalidGeometry { width: f32, height: f32 },

    /// Font or drawing primitive cannot render the requested text
    #[error("Render failure: {0}")]
    Render(String),

    /// Merging an overlay onto a page failed
    #[error("Composition failed on page {page}: {reason}")]
    Composition { page: u32, reason: String },

    /// Writing the output document failed
    #[error("Failed to write {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// No files matched pattern
    #[error("No PDF files found matching pattern: {0}")]
    NoFilesMatched(String),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// Failure while processing one document of a batch
    #[error("{}: {source}", .path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the document path to an error
    pub fn in_document(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Error::Document { .. } => self,
            other => Error::Document {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }
}
