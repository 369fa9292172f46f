//! Whole-document watermarking
//!
//! `Open → merge every page → assemble → persist`. The output is assembled
//! completely in memory and only then written, through a temporary file in the
//! destination directory that is renamed into place. A failure at any step
//! leaves no output file behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use chrono::Local;
use lopdf::{Dictionary, Document, Object, StringFormat};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use crate::layout::PageSize;
use super::merge::PageCompositor;
use super::overlay::{build_overlays, OverlayArtifact};

/// Value written to the output's /Producer entry
const PRODUCER: &str = concat!("pdf-watermark ", env!("CARGO_PKG_VERSION"));

/// Summary of one watermarked document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentReport {
    pub pages: usize,
    pub links_added: usize,
    pub links_dropped: usize,
}

/// Overlays built so far, keyed by page size
///
/// Artifacts are immutable, so one cache can serve every document of a batch.
/// The cache remembers the config its overlays were built from and starts
/// over when asked for a different one.
#[derive(Debug, Default)]
pub struct OverlayCache {
    config: Option<WatermarkConfig>,
    overlays: HashMap<(u32, u32), Vec<OverlayArtifact>>,
}

impl OverlayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays for a page size, building them on first request
    pub fn get_or_build(&mut self, width: f32, height: f32, config: &WatermarkConfig) -> Result<&[OverlayArtifact]> {
        if self.config.as_ref() != Some(config) {
            if self.config.is_some() {
                debug!("watermark config changed, dropping cached overlays");
            }
            self.overlays.clear();
            self.config = Some(config.clone());
        }

        let key = PageSize::new(width, height).cache_key();
        if !self.overlays.contains_key(&key) {
            debug!(width, height, "building overlays for new page size");
            let built = build_overlays(width, height, config)?;
            self.overlays.insert(key, built);
        }
        Ok(self.overlays.get(&key).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Number of distinct page sizes seen
    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}

/// Watermark every page of `input` and write the result to `output`
///
/// # Example
///
/// ```no_run
/// use pdf_watermark::config::WatermarkConfig;
/// use pdf_watermark::pdf::watermark_document;
/// use std::path::Path;
///
/// let config = WatermarkConfig::centered_link("site.example", "https://site.example");
/// watermark_document(Path::new("input.pdf"), Path::new("output.pdf"), &config)
///     .expect("Failed to watermark");
/// ```
pub fn watermark_document(input: &Path, output: &Path, config: &WatermarkConfig) -> Result<DocumentReport> {
    let mut cache = OverlayCache::new();
    watermark_document_with(input, output, config, &mut cache)
}

/// Like [`watermark_document`], reusing overlays from `cache`
pub fn watermark_document_with(
    input: &Path,
    output: &Path,
    config: &WatermarkConfig,
    cache: &mut OverlayCache,
) -> Result<DocumentReport> {
    if !input.exists() {
        return Err(Error::FileNotFound(input.to_path_buf()));
    }

    let mut doc = Document::load(input)?;
    let report = watermark_loaded(&mut doc, config, cache)?;
    if report.pages == 0 {
        return Err(Error::EmptyPdf(input.to_path_buf()));
    }

    let bytes = assemble(&mut doc)?;
    persist(output, &bytes)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        pages = report.pages,
        links = report.links_added,
        "watermarked document"
    );
    Ok(report)
}

/// Merge overlays onto every page of an already loaded document
pub fn watermark_loaded(doc: &mut Document, config: &WatermarkConfig, cache: &mut OverlayCache) -> Result<DocumentReport> {
    let pages: Vec<(u32, lopdf::ObjectId)> = doc.get_pages().into_iter().collect();
    let mut report = DocumentReport::default();
    let mut compositor = PageCompositor::new(doc);

    for (page_number, page_id) in pages {
        let geometry = compositor
            .geometry(page_id)
            .ok_or_else(|| Error::Composition {
                page: page_number,
                reason: "missing or malformed MediaBox".to_string(),
            })?;
        let size = geometry.size();
        let overlays = cache.get_or_build(size.width, size.height, config)?;

        let outcome = compositor.merge(page_number, page_id, overlays)?;
        report.pages += 1;
        report.links_added += outcome.links_added;
        report.links_dropped += outcome.links_dropped;
    }

    stamp_info(doc);
    Ok(report)
}

/// Record the producer and modification date, keeping every other Info entry
///
/// An Info entry that is not a usable dictionary is replaced by a fresh one.
fn stamp_info(doc: &mut Document) {
    let mod_date = Local::now().format("D:%Y%m%d%H%M%S").to_string();

    let info_id = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) if doc.get_dictionary(*id).is_ok() => *id,
        found => {
            let carried = match found {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                Ok(other) => {
                    debug!(?other, "replacing unusable Info entry");
                    Dictionary::new()
                }
                Err(_) => Dictionary::new(),
            };
            let id = doc.add_object(Object::Dictionary(carried));
            doc.trailer.set("Info", Object::Reference(id));
            id
        }
    };

    if let Ok(info) = doc.get_object_mut(info_id).and_then(Object::as_dict_mut) {
        info.set("Producer", Object::String(PRODUCER.as_bytes().to_vec(), StringFormat::Literal));
        info.set("ModDate", Object::String(mod_date.into_bytes(), StringFormat::Literal));
    }
}

/// Serialize the finished document into memory
fn assemble(doc: &mut Document) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Write `bytes` to `path` atomically
fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist_err = |source: std::io::Error| Error::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(persist_err)?;
    temp.write_all(bytes).map_err(persist_err)?;
    temp.as_file().sync_all().map_err(persist_err)?;
    temp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}
