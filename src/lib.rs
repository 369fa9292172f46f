//! PDF Watermark Library
//!
//! Stamps a repeatable watermark onto every page of PDF documents, keeping
//! page geometry, existing content and existing annotations intact.
//! This library provides functionality to:
//! - Build page-sized overlays: diagonal tiled text, or one centered rotated
//!   caption whose characters are individually clickable
//! - Composite overlays onto pages as Form XObjects plus link annotations
//! - Watermark whole documents with atomic output
//! - Mirror a directory tree of PDFs into a watermarked copy
//!
//! # Example
//!
//! ```no_run
//! use pdf_watermark::config::WatermarkConfig;
//! use pdf_watermark::pdf::watermark_document;
//! use std::path::Path;
//!
//! let config = WatermarkConfig::tiled("CONFIDENTIAL");
//! watermark_document(Path::new("in.pdf"), Path::new("out.pdf"), &config)
//!     .expect("Failed to watermark PDF");
//! ```

pub mod error;
pub mod config;
pub mod font;
pub mod layout;
pub mod pdf;
pub mod batch;

// Re-export commonly used items
pub use error::{Error, Result};
pub use config::{Layout, Rgba, WatermarkConfig};
pub use pdf::{build_overlay, OverlayArtifact, PageCompositor};
