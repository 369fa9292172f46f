//! PDF manipulation module

pub mod overlay;
pub mod merge;
pub mod metadata;
pub mod watermark;

// Re-export commonly used items
pub use overlay::{build_overlay, build_overlays, ClickableRegion, CoordinateSpace, OverlayArtifact, TextRun};
pub use merge::{page_geometry, MergeOutcome, PageCompositor, PageGeometry};
pub use metadata::{count_pages, document_metadata, extract_metadata, PageInfo, PdfMetadata};
pub use watermark::{watermark_document, watermark_document_with, watermark_loaded, DocumentReport, OverlayCache};
